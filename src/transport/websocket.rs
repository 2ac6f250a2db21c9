//! WebSocketトランスポートドライバ
//!
//! `tokio-tungstenite` でサーバーに接続し、受信フレームを [`InboundEvent`] に
//! デコードしてコントローラへ流す。接続の確立・切断・再接続は同じチャネルに
//! ライフサイクルイベントとして合成して送る。再接続ポリシーは
//! [`RetryConfig`] が持つ。
//!
//! 再接続に成功した場合は `reconnect` のみを通知し、`connect` は初回接続時に
//! 限って通知する。

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::protocol::{self, InboundEvent, OutboundEvent};
use super::retry::RetryConfig;
use super::TransportError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 1接続分のポンプ処理の終わり方
#[derive(Debug)]
enum PumpExit {
    /// 切断された（理由付き）
    Dropped(String),
    /// 送受信チャネルが閉じられた（シャットダウン）
    Shutdown,
}

/// WebSocketトランスポート
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    retry: RetryConfig,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            url: url.into(),
            retry,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// ドライバをバックグラウンドタスクとして起動
    pub fn spawn(
        self,
        outbound: mpsc::UnboundedReceiver<OutboundEvent>,
        events: mpsc::UnboundedSender<InboundEvent>,
    ) -> tokio::task::JoinHandle<Result<(), TransportError>> {
        tokio::spawn(async move {
            let result = self.run(outbound, events).await;
            if let Err(e) = &result {
                tracing::error!("❌ Transport driver stopped: {}", e);
            }
            result
        })
    }

    /// 接続・再接続ループを実行
    ///
    /// 送信チャネルかイベントチャネルが閉じられると正常終了する。
    /// 再接続上限に達した場合は `reconnect_failed` を通知してから
    /// [`TransportError::RetriesExhausted`] を返す。
    pub async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<OutboundEvent>,
        events: mpsc::UnboundedSender<InboundEvent>,
    ) -> Result<(), TransportError> {
        let mut connected_once = false;
        let mut attempt: u32 = 0;

        loop {
            match self.connect_once().await {
                Ok(socket) => {
                    let lifecycle = if connected_once {
                        InboundEvent::Reconnect { attempt }
                    } else {
                        InboundEvent::Connect
                    };
                    if !notify(&events, lifecycle) {
                        return Ok(());
                    }
                    connected_once = true;
                    attempt = 0;

                    match pump(socket, &mut outbound, &events).await {
                        PumpExit::Shutdown => {
                            tracing::info!("🛑 Transport driver shutting down");
                            return Ok(());
                        }
                        PumpExit::Dropped(reason) => {
                            if !notify(&events, InboundEvent::Disconnect { reason }) {
                                return Ok(());
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(url = %self.url, "Connection attempt failed: {}", e);
                    let error = InboundEvent::ConnectError {
                        error: e.to_string(),
                    };
                    if !notify(&events, error) {
                        return Ok(());
                    }
                }
            }

            attempt += 1;
            if !self.retry.allows(attempt) {
                notify(&events, InboundEvent::ReconnectFailed);
                return Err(TransportError::RetriesExhausted(self.retry.max_attempts));
            }
            if !notify(&events, InboundEvent::Reconnecting { attempt }) {
                return Ok(());
            }

            if !self.backoff(attempt, &mut outbound).await {
                return Ok(());
            }
        }
    }

    async fn connect_once(&self) -> Result<Socket, TransportError> {
        let timeout = self.retry.handshake_timeout();
        match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(self.url.as_str()))
            .await
        {
            Ok(Ok((socket, _response))) => {
                tracing::debug!(url = %self.url, "🤝 WebSocket handshake completed");
                Ok(socket)
            }
            Ok(Err(e)) => Err(TransportError::Connect(e)),
            Err(_) => Err(TransportError::HandshakeTimeout(timeout)),
        }
    }

    /// バックオフ待機。待機中に積まれた送信イベントは破棄する。
    ///
    /// 送信チャネルが閉じられたら `false` を返す。
    async fn backoff(
        &self,
        attempt: u32,
        outbound: &mut mpsc::UnboundedReceiver<OutboundEvent>,
    ) -> bool {
        let sleep = tokio::time::sleep(self.retry.delay_for(attempt));
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                event = outbound.recv() => match event {
                    Some(event) => {
                        tracing::warn!(
                            event = event.name(),
                            "⚠️ Dropping outbound event while reconnecting"
                        );
                    }
                    None => return false,
                },
            }
        }
    }
}

fn notify(events: &mpsc::UnboundedSender<InboundEvent>, event: InboundEvent) -> bool {
    events.send(event).is_ok()
}

/// 1接続分の送受信ループ
async fn pump(
    socket: Socket,
    outbound: &mut mpsc::UnboundedReceiver<OutboundEvent>,
    events: &mpsc::UnboundedSender<InboundEvent>,
) -> PumpExit {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match protocol::decode(&text) {
                            Ok(event) if event.kind().is_lifecycle() => {
                                tracing::debug!(
                                    event = %event.kind(),
                                    "Ignoring lifecycle event sent by server"
                                );
                            }
                            Ok(event) => {
                                if events.send(event).is_err() {
                                    return PumpExit::Shutdown;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("⚠️ Dropping malformed frame: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            return PumpExit::Dropped(e.to_string());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "io server disconnect".to_string());
                        return PumpExit::Dropped(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return PumpExit::Dropped(e.to_string());
                    }
                    None => {
                        return PumpExit::Dropped("transport close".to_string());
                    }
                }
            }

            out = outbound.recv() => {
                match out {
                    Some(event) => match protocol::encode(&event) {
                        Ok(json) => {
                            if let Err(e) = write.send(Message::Text(json)).await {
                                return PumpExit::Dropped(e.to_string());
                            }
                        }
                        Err(e) => {
                            tracing::error!(
                                event = event.name(),
                                "Failed to encode outbound event: {}",
                                e
                            );
                        }
                    },
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return PumpExit::Shutdown;
                    }
                }
            }
        }
    }
}
