//! サーバーとの双方向イベントチャネル
//!
//! - `protocol`: イベントフレームのエンコード/デコード
//! - `retry`: 再接続ポリシー
//! - `session`: 接続状態機械とハンドラ登録
//! - `websocket`: tokio-tungstenite による接続ドライバ

pub mod protocol;
pub mod retry;
pub mod session;
pub mod websocket;

use std::time::Duration;
use thiserror::Error;

pub use protocol::{EventKind, InboundEvent, OutboundEvent};
pub use retry::RetryConfig;
pub use session::{ConnectionState, EventHandler, PongRecord, TransportHandle, TransportSession};
pub use websocket::WebSocketTransport;

/// トランスポート層のエラー
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("接続に失敗しました: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("ハンドシェイクがタイムアウトしました ({0:?})")]
    HandshakeTimeout(Duration),

    #[error("再接続の上限 ({0} 回) に達しました")]
    RetriesExhausted(u32),
}
