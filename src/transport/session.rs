//! トランスポートセッション
//!
//! 物理接続1本分の状態機械。接続ライフサイクルイベントを受け取って
//! [`ConnectionState`] を遷移させ、登録されたハンドラへ受信順に配信する。
//! 送信は [`TransportHandle::emit`] を通じて行い、接続中以外は破棄される。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::protocol::{EventKind, InboundEvent, OutboundEvent};

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

/// 接続状態と送信チャネルの共有ハンドル
///
/// クローンして保留中プロンプトの継続などに渡せる。状態の書き換えは
/// [`TransportSession`] だけが行う。
#[derive(Debug, Clone)]
pub struct TransportHandle {
    state: Arc<RwLock<ConnectionState>>,
    outbound: mpsc::UnboundedSender<OutboundEvent>,
}

impl TransportHandle {
    /// 送信チャネルと組にしてハンドルを作成
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outbound,
        };
        (handle, receiver)
    }

    /// 現在の接続状態
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn set_state(&self, new_state: ConnectionState) -> ConnectionState {
        let mut guard = self.state.write();
        std::mem::replace(&mut *guard, new_state)
    }

    /// イベントを送信する
    ///
    /// 接続中でなければ何もせず警告ログのみ出して `false` を返す。
    /// 送信はキューイングも再送もしない。
    pub fn emit(&self, event: OutboundEvent) -> bool {
        let state = self.state();
        if state != ConnectionState::Connected {
            tracing::warn!(
                event = event.name(),
                state = state.as_str(),
                "⚠️ Not connected, dropping outbound event"
            );
            return false;
        }

        let name = event.name();
        if self.outbound.send(event).is_err() {
            tracing::warn!(event = name, "⚠️ Outbound channel closed, event dropped");
            return false;
        }

        tracing::debug!(event = name, "📤 Outbound event queued");
        true
    }
}

/// 受信イベントハンドラ
pub type EventHandler = Box<dyn FnMut(&InboundEvent) + Send>;

/// 直近のpong記録
#[derive(Debug, Clone, PartialEq)]
pub struct PongRecord {
    /// サーバーが返した時刻
    pub server_time: Option<f64>,
    /// 往復時間（対応するpingが分かる場合のみ）
    pub round_trip: Option<Duration>,
}

/// トランスポートセッション
pub struct TransportSession {
    handle: TransportHandle,
    attempt: u32,
    gave_up: bool,
    handlers: HashMap<EventKind, Vec<EventHandler>>,
    ping_sent_at: Option<Instant>,
    last_pong: Option<PongRecord>,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("state", &self.handle.state())
            .field("attempt", &self.attempt)
            .field("gave_up", &self.gave_up)
            .field("handler_kinds", &self.handlers.len())
            .finish()
    }
}

impl TransportSession {
    pub fn new(handle: TransportHandle) -> Self {
        Self {
            handle,
            attempt: 0,
            gave_up: false,
            handlers: HashMap::new(),
            ping_sent_at: None,
            last_pong: None,
        }
    }

    /// 共有ハンドルを取得
    pub fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// 現在の再接続試行回数（接続成功で0に戻る）
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// 再接続上限に達して諦めたかどうか
    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    /// 「再接続中」インジケータを表示すべきかどうか
    pub fn reconnecting_indicator(&self) -> bool {
        self.state() == ConnectionState::Reconnecting
    }

    pub fn last_pong(&self) -> Option<&PongRecord> {
        self.last_pong.as_ref()
    }

    /// 接続開始を記録する（ドライバ起動直前に呼ぶ）
    pub fn begin_connect(&mut self) {
        self.gave_up = false;
        self.attempt = 0;
        self.handle.set_state(ConnectionState::Connecting);
        tracing::info!("🔌 Connecting to server");
    }

    /// ハンドラを登録する
    ///
    /// 同じ種別に複数登録した場合は登録順に呼ばれる。
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&InboundEvent) + Send + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// イベントを送信（[`TransportHandle::emit`] と同じ）
    pub fn emit(&self, event: OutboundEvent) -> bool {
        self.handle.emit(event)
    }

    /// 死活確認pingを送信
    pub fn ping(&mut self) -> bool {
        let sent = self.handle.emit(OutboundEvent::Ping);
        if sent {
            self.ping_sent_at = Some(Instant::now());
        }
        sent
    }

    /// 受信イベントを処理する
    ///
    /// ライフサイクルイベントなら状態を遷移させてから、登録済みハンドラを呼ぶ。
    pub fn receive(&mut self, event: &InboundEvent) {
        match event {
            InboundEvent::Connect => {
                self.handle.set_state(ConnectionState::Connected);
                self.attempt = 0;
                self.gave_up = false;
                tracing::info!("✅ Connected to server");
            }
            InboundEvent::Disconnect { reason } => {
                self.handle.set_state(ConnectionState::Disconnected);
                tracing::warn!(reason = %reason, "🔌 Disconnected from server");
            }
            InboundEvent::ConnectError { error } => {
                if self.state() == ConnectionState::Connecting {
                    self.handle.set_state(ConnectionState::Disconnected);
                }
                tracing::warn!(error = %error, "❌ Connection error");
            }
            InboundEvent::Reconnecting { attempt } => {
                self.handle.set_state(ConnectionState::Reconnecting);
                self.attempt = *attempt;
                tracing::info!(attempt = attempt, "🔄 Reconnecting");
            }
            InboundEvent::Reconnect { attempt } => {
                let retried = (*attempt).max(self.attempt);
                self.handle.set_state(ConnectionState::Connected);
                self.attempt = 0;
                self.gave_up = false;
                tracing::info!(attempt = retried, "✅ Reconnected to server");

                // 切断中に取りこぼしたイベントは再送されないため、チャンネル一覧を取り直す
                if retried >= 1 {
                    tracing::info!("🔁 Resynchronizing active channel list");
                    self.handle.emit(OutboundEvent::GetActiveChannels);
                }
            }
            InboundEvent::ReconnectFailed => {
                self.handle.set_state(ConnectionState::Disconnected);
                self.gave_up = true;
                tracing::error!(
                    attempts = self.attempt,
                    "❌ Reconnection failed, giving up"
                );
            }
            InboundEvent::Pong { time } => {
                let round_trip = self.ping_sent_at.take().map(|sent| sent.elapsed());
                tracing::debug!(server_time = ?time, round_trip = ?round_trip, "🏓 Pong received");
                self.last_pong = Some(PongRecord {
                    server_time: *time,
                    round_trip,
                });
            }
            _ => {}
        }

        if let Some(handlers) = self.handlers.get_mut(&event.kind()) {
            for handler in handlers.iter_mut() {
                handler(event);
            }
        }
    }
}
