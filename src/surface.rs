//! 描画面との境界
//!
//! コア（チャンネルレジストリ・プロンプトキュー・コントローラ）は描画について
//! 何も知らず、状態変化をすべて [`RenderSurface`] 経由で通知する。
//! 端末UIやテストはこのトレイトを実装して差し替える。

use serde_json::Value;
use tokio::sync::mpsc;

use crate::channels::{ChannelMetadata, ChatMessage, SessionId};
use crate::prompts::PromptId;
use crate::transport::ConnectionState;

/// チャンネルレジストリの変更通知
///
/// いずれも安定した [`SessionId`] を持つので、描画側はパネルを作り直さずに
/// 差分更新できる。
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelChange {
    Created {
        id: SessionId,
        name: String,
    },
    MessageAppended {
        id: SessionId,
        name: String,
        message: ChatMessage,
        /// 容量超過で捨てられた件数
        evicted: usize,
    },
    MetadataUpdated {
        id: SessionId,
        name: String,
        metadata: ChannelMetadata,
    },
    Removed {
        id: SessionId,
        name: String,
    },
    /// フォーカス中のチャンネルが変わった（`None` は未選択）
    SelectionChanged {
        id: Option<SessionId>,
        name: Option<String>,
    },
}

/// 接続状態の表示用通知
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected { reason: String },
    Error { error: String },
    /// 再接続中（インジケータを表示する）
    Reconnecting { attempt: u32 },
    /// 再接続成功（インジケータを隠す）
    Reconnected,
    /// 再接続を諦めた
    Failed,
}

impl ConnectionStatus {
    /// この通知に対応する接続状態
    pub fn state(&self) -> ConnectionState {
        match self {
            ConnectionStatus::Connected | ConnectionStatus::Reconnected => {
                ConnectionState::Connected
            }
            ConnectionStatus::Reconnecting { .. } => ConnectionState::Reconnecting,
            ConnectionStatus::Disconnected { .. }
            | ConnectionStatus::Error { .. }
            | ConnectionStatus::Failed => ConnectionState::Disconnected,
        }
    }

    /// 「再接続中」インジケータを表示すべきかどうか
    pub fn shows_indicator(&self) -> bool {
        matches!(self, ConnectionStatus::Reconnecting { .. })
    }
}

/// ユーザーに提示するプロンプトの内容
#[derive(Debug, Clone, PartialEq)]
pub struct PromptView {
    pub id: PromptId,
    pub channel: String,
    pub info: Value,
    /// 提示時点で後ろに待っている件数
    pub waiting: usize,
}

/// 描画面
///
/// デフォルト実装はすべて何もしない。
pub trait RenderSurface: Send + Sync {
    fn channel_changed(&self, _change: &ChannelChange) {}

    fn connection_changed(&self, _status: &ConnectionStatus) {}

    /// プロンプトを1件提示する。キューが同時に1件しか呼ばないことを保証する。
    fn present_prompt(&self, _prompt: &PromptView) {}
}

/// 何も描画しない描画面
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl RenderSurface for NullSurface {}

/// 描画面へのイベント
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Channel(ChannelChange),
    Connection(ConnectionStatus),
    Prompt(PromptView),
}

/// 変更通知をチャネルへ流す描画面
///
/// 受信側（UIタスク）は自分のペースで `SurfaceEvent` を消費する。
#[derive(Debug, Clone)]
pub struct EventSurface {
    sender: mpsc::UnboundedSender<SurfaceEvent>,
}

impl EventSurface {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn forward(&self, event: SurfaceEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Surface receiver dropped, discarding event");
        }
    }
}

impl RenderSurface for EventSurface {
    fn channel_changed(&self, change: &ChannelChange) {
        self.forward(SurfaceEvent::Channel(change.clone()));
    }

    fn connection_changed(&self, status: &ConnectionStatus) {
        self.forward(SurfaceEvent::Connection(status.clone()));
    }

    fn present_prompt(&self, prompt: &PromptView) {
        self.forward(SurfaceEvent::Prompt(prompt.clone()));
    }
}
