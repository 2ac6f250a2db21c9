//! セッションコントローラ
//!
//! トランスポートからの受信イベントとユーザー操作を1本のループで順番に処理し、
//! チャンネルレジストリ・プロンプトキュー・描画面へ振り分ける。
//! すべての状態はこのループが所有するため、コア状態にロックは不要。

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::channels::{ChannelRegistry, MessageTag};
use crate::config::AppConfig;
use crate::error::{ChanviewError, ChanviewResult};
use crate::prompts::{Decision, PromptQueue};
use crate::surface::{ConnectionStatus, RenderSurface};
use crate::transport::{
    ConnectionState, EventKind, InboundEvent, OutboundEvent, TransportHandle, TransportSession,
};

/// ユーザー操作
#[derive(Debug, Clone, PartialEq)]
pub enum UserIntent {
    /// チャットを送信
    SendChat { channel: String, text: String },
    /// チャンネルに参加（ローカルにもセッションを作る）
    JoinChannel { channel: String },
    SkipChannel { channel: String },
    /// 提示中のプロンプトに応答
    ResolvePrompt(Decision),
    /// フォーカスを移す
    Select(String),
    /// チャンネルを閉じる
    Remove(String),
    /// 入力中テキストを保存
    SetDraft { channel: String, text: String },
    Ping,
    /// ループを終了
    Shutdown,
}

/// コントローラへ操作を送るハンドル
#[derive(Debug, Clone)]
pub struct SessionHandle {
    intents: mpsc::UnboundedSender<UserIntent>,
}

impl SessionHandle {
    /// 操作チャネルを作成
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UserIntent>) {
        let (intents, receiver) = mpsc::unbounded_channel();
        (Self { intents }, receiver)
    }

    pub fn send(&self, intent: UserIntent) -> ChanviewResult<()> {
        self.intents
            .send(intent)
            .map_err(|_| ChanviewError::SessionClosed)
    }

    pub fn send_chat(
        &self,
        channel: impl Into<String>,
        text: impl Into<String>,
    ) -> ChanviewResult<()> {
        self.send(UserIntent::SendChat {
            channel: channel.into(),
            text: text.into(),
        })
    }

    pub fn resolve_prompt(&self, decision: Decision) -> ChanviewResult<()> {
        self.send(UserIntent::ResolvePrompt(decision))
    }

    pub fn shutdown(&self) -> ChanviewResult<()> {
        self.send(UserIntent::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.intents.is_closed()
    }
}

/// セッションコントローラ
pub struct SessionController {
    transport: TransportSession,
    registry: ChannelRegistry,
    prompts: PromptQueue,
    surface: Arc<dyn RenderSurface>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("transport", &self.transport)
            .field("registry", &self.registry)
            .field("prompts", &self.prompts)
            .finish()
    }
}

impl SessionController {
    pub fn new(
        handle: TransportHandle,
        surface: Arc<dyn RenderSurface>,
        config: &AppConfig,
    ) -> Self {
        Self {
            transport: TransportSession::new(handle),
            registry: ChannelRegistry::with_capacity(
                Arc::clone(&surface),
                config.history_capacity,
            ),
            prompts: PromptQueue::new(Arc::clone(&surface)),
            surface,
        }
    }

    pub fn transport(&self) -> &TransportSession {
        &self.transport
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn prompts(&self) -> &PromptQueue {
        &self.prompts
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// 受信イベントの監視ハンドラを追加する
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&InboundEvent) + Send + 'static,
    {
        self.transport.on(kind, handler);
    }

    /// 接続開始を記録する
    pub fn begin_connect(&mut self) {
        self.transport.begin_connect();
    }

    /// 受信イベントを処理する
    pub fn handle_event(&mut self, event: InboundEvent) {
        self.transport.receive(&event);

        match event {
            InboundEvent::Connect => {
                self.surface.connection_changed(&ConnectionStatus::Connected);
                self.transport.emit(OutboundEvent::GetActiveChannels);
            }
            InboundEvent::Disconnect { reason } => {
                self.surface
                    .connection_changed(&ConnectionStatus::Disconnected { reason });
            }
            InboundEvent::ConnectError { error } => {
                self.surface
                    .connection_changed(&ConnectionStatus::Error { error });
            }
            InboundEvent::Reconnecting { attempt } => {
                self.surface
                    .connection_changed(&ConnectionStatus::Reconnecting { attempt });
            }
            InboundEvent::Reconnect { .. } => {
                // チャンネル一覧の再取得はトランスポートセッション側で送信済み
                self.surface.connection_changed(&ConnectionStatus::Reconnected);
            }
            InboundEvent::ReconnectFailed => {
                self.surface.connection_changed(&ConnectionStatus::Failed);
            }
            InboundEvent::ServerHello { sid } => {
                tracing::info!(sid = ?sid, "👋 Server acknowledged connection");
            }
            InboundEvent::Pong { .. } => {}
            InboundEvent::ChannelJoined { channel } => {
                self.registry.ensure(&channel);
            }
            InboundEvent::ActiveChannels { channels } => {
                if channels.is_empty() {
                    tracing::debug!("No active channels reported");
                }
                for channel in &channels {
                    self.registry.ensure(channel);
                }
            }
            InboundEvent::ChatMessage {
                channel,
                tag,
                text,
                timestamp,
            } => {
                let timestamp = timestamp.unwrap_or_else(local_timestamp);
                self.registry
                    .append(&channel, MessageTag::from_label(&tag), text, timestamp);
            }
            InboundEvent::ChannelMeta { channel, update } => {
                if update.is_empty() {
                    tracing::debug!(channel = %channel, "Ignoring empty metadata update");
                } else {
                    self.registry.update_metadata(&channel, update);
                }
            }
            InboundEvent::StreamOnline { channel, info } => {
                self.enqueue_stream_prompt(channel, info);
            }
            InboundEvent::ChatSent { channel, message } => {
                tracing::debug!(channel = %channel, message = %message, "📨 Chat delivered");
            }
            InboundEvent::JoinAccepted { channel } => {
                tracing::info!(channel = %channel, "🙋 Join request accepted");
            }
            InboundEvent::ChannelSkipped { channel } => {
                tracing::info!(channel = ?channel, "⏭️ Channel skipped");
            }
        }
    }

    fn enqueue_stream_prompt(&mut self, channel: String, info: serde_json::Value) {
        let join_handle = self.transport.handle().clone();
        let skip_handle = join_handle.clone();
        let join_channel = channel.clone();
        let skip_channel = channel.clone();

        self.prompts.enqueue(
            channel,
            info,
            move || {
                join_handle.emit(OutboundEvent::JoinChannel {
                    channel: join_channel,
                });
            },
            move || {
                skip_handle.emit(OutboundEvent::SkipChannel {
                    channel: skip_channel,
                });
            },
        );
    }

    /// チャットを送信する
    ///
    /// 前後の空白を除いて空なら送らない。接続中でなければ送らない。
    /// 自分の発言はサーバーからの `chat_message` で届くまで表示しない。
    pub fn send_chat(&mut self, channel: &str, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!(channel = channel, "Empty chat message ignored");
            return false;
        }
        if !self.transport.handle().is_connected() {
            tracing::warn!(channel = channel, "⚠️ Not connected, chat message not sent");
            return false;
        }

        let sent = self.transport.emit(OutboundEvent::SendChat {
            channel: channel.to_string(),
            message: text.to_string(),
        });
        if sent {
            self.registry.take_draft(channel);
        }
        sent
    }

    /// ユーザー操作を処理する
    pub fn handle_intent(&mut self, intent: UserIntent) -> ChanviewResult<()> {
        match intent {
            UserIntent::SendChat { channel, text } => {
                self.send_chat(&channel, &text);
            }
            UserIntent::JoinChannel { channel } => {
                self.registry.ensure(&channel);
                self.transport.emit(OutboundEvent::JoinChannel { channel });
            }
            UserIntent::SkipChannel { channel } => {
                self.transport.emit(OutboundEvent::SkipChannel { channel });
            }
            UserIntent::ResolvePrompt(decision) => {
                self.prompts.resolve(decision)?;
            }
            UserIntent::Select(channel) => {
                self.registry.select(&channel);
            }
            UserIntent::Remove(channel) => {
                self.registry.remove(&channel);
            }
            UserIntent::SetDraft { channel, text } => {
                self.registry.set_draft(&channel, text);
            }
            UserIntent::Ping => {
                self.transport.ping();
            }
            UserIntent::Shutdown => {}
        }
        Ok(())
    }

    /// イベントループを実行する
    ///
    /// 受信イベントを操作より優先して処理する。
    /// `Shutdown` を受け取るか操作チャネルが閉じられると終了し、
    /// 最終状態のコントローラを返す。受信チャネルが先に閉じても
    /// ローカル操作（選択・削除など）は引き続き受け付ける。
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<InboundEvent>,
        mut intents: mpsc::UnboundedReceiver<UserIntent>,
    ) -> Self {
        tracing::info!("🚀 Session controller started");
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        tracing::info!("🔌 Transport event stream closed");
                        events_open = false;
                    }
                },
                intent = intents.recv() => match intent {
                    Some(UserIntent::Shutdown) | None => break,
                    Some(intent) => {
                        if let Err(e) = self.handle_intent(intent) {
                            tracing::warn!("⚠️ User action failed: {}", e);
                        }
                    }
                },
            }
        }

        tracing::info!("🏁 Session controller stopped");
        self
    }
}

fn local_timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
