//! 割り込みプロンプト
//!
//! 複数チャンネルから同時に届く「参加しますか？」プロンプトを1件ずつ
//! 順番に提示する。

pub mod queue;

use thiserror::Error;

pub use queue::{Continuation, Decision, Prompt, PromptId, PromptQueue};

/// プロンプトキューのエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("提示中のプロンプトがありません")]
    NothingPresented,
}
