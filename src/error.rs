//! クレート共通のエラー型

use thiserror::Error;

use crate::prompts::PromptError;
use crate::transport::protocol::ProtocolError;
use crate::transport::TransportError;

/// chanview全体のエラー型
#[derive(Debug, Error)]
pub enum ChanviewError {
    #[error("トランスポートエラー: {0}")]
    Transport(#[from] TransportError),

    #[error("プロトコルエラー: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("プロンプトエラー: {0}")]
    Prompt(#[from] PromptError),

    #[error("設定エラー: {0}")]
    Configuration(String),

    #[error("セッションループが停止しています")]
    SessionClosed,

    #[error(transparent)]
    General(#[from] anyhow::Error),
}

/// chanview全体のResult型
pub type ChanviewResult<T> = Result<T, ChanviewError>;
