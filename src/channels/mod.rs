//! チャンネルごとの会話状態
//!
//! - `message_log`: 容量固定のメッセージログ
//! - `session`: 1チャンネル分の状態とメッセージ型
//! - `registry`: チャンネル名をキーにしたセッションの集合と選択状態

pub mod message_log;
pub mod registry;
pub mod session;

pub use message_log::{MessageLog, DEFAULT_LOG_CAPACITY};
pub use registry::ChannelRegistry;
pub use session::{
    ChannelMetadata, ChannelSession, ChatMessage, MessageTag, MetadataUpdate, SessionId,
};

pub use crate::surface::ChannelChange;
