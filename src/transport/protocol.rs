//! ワイヤープロトコル定義
//!
//! サーバーとの間でやり取りされるイベントフレーム。テキストメッセージ1件が
//! `{"event": "<名前>", "data": <ペイロード>}` 形式のJSON 1フレームに対応する。
//!
//! 受信側はペイロードの欠損に寛容に作られている。オプション項目の欠損は
//! そのまま `None` として扱い、チャンネル名のような識別子が欠けている場合のみ
//! そのフレームを破棄する（[`ProtocolError::MissingChannel`]）。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::channels::MetadataUpdate;

/// プロトコル層のエラー
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSONパースエラー: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("未知のイベント: {0}")]
    UnknownEvent(String),

    #[error("イベント '{0}' にチャンネル名がありません")]
    MissingChannel(&'static str),

    #[error("イベント '{event}' のペイロードが不正です: {reason}")]
    InvalidPayload { event: &'static str, reason: String },
}

/// 受信フレームの生形式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// 受信イベントの種別
///
/// ハンドラ登録（`TransportSession::on`）のキーとして使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    ConnectError,
    Reconnecting,
    Reconnect,
    ReconnectFailed,
    ServerHello,
    Pong,
    ChannelJoined,
    ActiveChannels,
    ChatMessage,
    ChannelMeta,
    StreamOnline,
    ChatSent,
    JoinAccepted,
    ChannelSkipped,
}

impl EventKind {
    /// ワイヤー上のイベント名
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::ConnectError => "connect_error",
            EventKind::Reconnecting => "reconnecting",
            EventKind::Reconnect => "reconnect",
            EventKind::ReconnectFailed => "reconnect_failed",
            EventKind::ServerHello => "connected",
            EventKind::Pong => "pong",
            EventKind::ChannelJoined => "channel_joined",
            EventKind::ActiveChannels => "active_channels",
            EventKind::ChatMessage => "chat_message",
            EventKind::ChannelMeta => "channel_meta",
            EventKind::StreamOnline => "stream_online",
            EventKind::ChatSent => "chat_sent",
            EventKind::JoinAccepted => "join_accepted",
            EventKind::ChannelSkipped => "channel_skipped",
        }
    }

    /// イベント名から種別を解決
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "connect" => EventKind::Connect,
            "disconnect" => EventKind::Disconnect,
            "connect_error" => EventKind::ConnectError,
            "reconnecting" => EventKind::Reconnecting,
            "reconnect" => EventKind::Reconnect,
            "reconnect_failed" => EventKind::ReconnectFailed,
            "connected" => EventKind::ServerHello,
            "pong" => EventKind::Pong,
            "channel_joined" => EventKind::ChannelJoined,
            "active_channels" => EventKind::ActiveChannels,
            "chat_message" => EventKind::ChatMessage,
            "channel_meta" => EventKind::ChannelMeta,
            "stream_online" => EventKind::StreamOnline,
            "chat_sent" => EventKind::ChatSent,
            "join_accepted" => EventKind::JoinAccepted,
            "channel_skipped" => EventKind::ChannelSkipped,
            _ => return None,
        };
        Some(kind)
    }

    /// 接続ライフサイクルに属するイベントかどうか
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            EventKind::Connect
                | EventKind::Disconnect
                | EventKind::ConnectError
                | EventKind::Reconnecting
                | EventKind::Reconnect
                | EventKind::ReconnectFailed
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 受信イベント
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// 初回接続の確立
    Connect,
    /// 予期しない切断
    Disconnect { reason: String },
    /// 接続エラー
    ConnectError { error: String },
    /// 再接続試行中
    Reconnecting { attempt: u32 },
    /// 再接続成功
    Reconnect { attempt: u32 },
    /// 再接続上限に到達
    ReconnectFailed,
    /// サーバーからの接続確認
    ServerHello { sid: Option<String> },
    /// pingへの応答
    Pong { time: Option<f64> },
    /// チャンネル参加の確認
    ChannelJoined { channel: String },
    /// アクティブチャンネル一覧
    ActiveChannels { channels: Vec<String> },
    /// チャットメッセージ
    ChatMessage {
        channel: String,
        tag: String,
        text: String,
        timestamp: Option<String>,
    },
    /// チャンネルメタデータ（部分更新）
    ChannelMeta {
        channel: String,
        update: MetadataUpdate,
    },
    /// 配信開始通知
    StreamOnline { channel: String, info: Value },
    /// チャット送信の確認
    ChatSent { channel: String, message: String },
    /// 参加リクエストの受理
    JoinAccepted { channel: String },
    /// スキップの受理
    ChannelSkipped { channel: Option<String> },
}

impl InboundEvent {
    /// イベント種別を取得
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::Connect => EventKind::Connect,
            InboundEvent::Disconnect { .. } => EventKind::Disconnect,
            InboundEvent::ConnectError { .. } => EventKind::ConnectError,
            InboundEvent::Reconnecting { .. } => EventKind::Reconnecting,
            InboundEvent::Reconnect { .. } => EventKind::Reconnect,
            InboundEvent::ReconnectFailed => EventKind::ReconnectFailed,
            InboundEvent::ServerHello { .. } => EventKind::ServerHello,
            InboundEvent::Pong { .. } => EventKind::Pong,
            InboundEvent::ChannelJoined { .. } => EventKind::ChannelJoined,
            InboundEvent::ActiveChannels { .. } => EventKind::ActiveChannels,
            InboundEvent::ChatMessage { .. } => EventKind::ChatMessage,
            InboundEvent::ChannelMeta { .. } => EventKind::ChannelMeta,
            InboundEvent::StreamOnline { .. } => EventKind::StreamOnline,
            InboundEvent::ChatSent { .. } => EventKind::ChatSent,
            InboundEvent::JoinAccepted { .. } => EventKind::JoinAccepted,
            InboundEvent::ChannelSkipped { .. } => EventKind::ChannelSkipped,
        }
    }
}

/// 送信イベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// アクティブチャンネル一覧を要求
    GetActiveChannels,
    /// チャンネルへの参加を要求
    JoinChannel { channel: String },
    /// チャンネルをスキップ
    SkipChannel { channel: String },
    /// チャットを送信
    SendChat { channel: String, message: String },
    /// 死活確認
    Ping,
}

impl OutboundEvent {
    /// ワイヤー上のイベント名
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::GetActiveChannels => "get_active_channels",
            OutboundEvent::JoinChannel { .. } => "join_channel",
            OutboundEvent::SkipChannel { .. } => "skip_channel",
            OutboundEvent::SendChat { .. } => "send_chat",
            OutboundEvent::Ping => "ping",
        }
    }
}

/// 送信イベントをテキストフレームにエンコード
pub fn encode(event: &OutboundEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

/// テキストフレームを受信イベントにデコード
pub fn decode(text: &str) -> Result<InboundEvent, ProtocolError> {
    let frame: Frame = serde_json::from_str(text)?;
    decode_frame(&frame)
}

/// 生フレームを受信イベントに変換
pub fn decode_frame(frame: &Frame) -> Result<InboundEvent, ProtocolError> {
    let kind = EventKind::from_name(&frame.event)
        .ok_or_else(|| ProtocolError::UnknownEvent(frame.event.clone()))?;
    let data = &frame.data;

    let event = match kind {
        EventKind::Connect => InboundEvent::Connect,
        EventKind::Disconnect => InboundEvent::Disconnect {
            reason: str_field(data, "reason")
                .or_else(|| data.as_str().map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string()),
        },
        EventKind::ConnectError => InboundEvent::ConnectError {
            error: str_field(data, "error")
                .or_else(|| data.as_str().map(str::to_string))
                .unwrap_or_else(|| data.to_string()),
        },
        EventKind::Reconnecting => InboundEvent::Reconnecting {
            attempt: attempt_field(data),
        },
        EventKind::Reconnect => InboundEvent::Reconnect {
            attempt: attempt_field(data),
        },
        EventKind::ReconnectFailed => InboundEvent::ReconnectFailed,
        EventKind::ServerHello => InboundEvent::ServerHello {
            sid: str_field(data, "sid"),
        },
        EventKind::Pong => InboundEvent::Pong {
            time: data.get("time").and_then(Value::as_f64),
        },
        EventKind::ChannelJoined => InboundEvent::ChannelJoined {
            channel: require_channel(data, kind)?,
        },
        EventKind::ActiveChannels => InboundEvent::ActiveChannels {
            channels: channel_list(data)?,
        },
        EventKind::ChatMessage => InboundEvent::ChatMessage {
            channel: require_channel(data, kind)?,
            tag: str_field(data, "tag").unwrap_or_else(|| "user".to_string()),
            text: str_field(data, "text").unwrap_or_default(),
            timestamp: str_field(data, "timestamp").filter(|t| !t.is_empty()),
        },
        EventKind::ChannelMeta => InboundEvent::ChannelMeta {
            channel: require_channel(data, kind)?,
            update: MetadataUpdate {
                game: str_field(data, "game"),
                viewers: data.get("viewers").and_then(Value::as_u64),
                thumbnail: str_field(data, "thumbnail"),
            },
        },
        EventKind::StreamOnline => {
            let info = data.get("info").cloned().unwrap_or(Value::Null);
            // channel が無い場合は info.user / user にフォールバック
            let channel = non_empty(str_field(data, "channel"))
                .or_else(|| non_empty(str_field(data, "user")))
                .or_else(|| non_empty(str_field(&info, "user")))
                .ok_or(ProtocolError::MissingChannel(kind.as_str()))?;
            InboundEvent::StreamOnline { channel, info }
        }
        EventKind::ChatSent => InboundEvent::ChatSent {
            channel: require_channel(data, kind)?,
            message: str_field(data, "message").unwrap_or_default(),
        },
        EventKind::JoinAccepted => InboundEvent::JoinAccepted {
            channel: require_channel(data, kind)?,
        },
        EventKind::ChannelSkipped => InboundEvent::ChannelSkipped {
            channel: non_empty(str_field(data, "channel")),
        },
    };

    Ok(event)
}

fn str_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn require_channel(data: &Value, kind: EventKind) -> Result<String, ProtocolError> {
    non_empty(str_field(data, "channel")).ok_or(ProtocolError::MissingChannel(kind.as_str()))
}

fn attempt_field(data: &Value) -> u32 {
    data.get("attempt")
        .and_then(Value::as_u64)
        .or_else(|| data.as_u64())
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn channel_list(data: &Value) -> Result<Vec<String>, ProtocolError> {
    match data.get("channels") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()),
        Some(other) => Err(ProtocolError::InvalidPayload {
            event: EventKind::ActiveChannels.as_str(),
            reason: format!("channels must be an array, got {}", other),
        }),
    }
}
