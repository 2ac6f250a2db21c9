//! プロンプトキュー
//!
//! 厳密なFIFO。画面に出すのは常に高々1件で、ユーザーが応答するまで次は出さない。
//! 優先度や同一チャンネルの重複排除は行わない。

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

use super::PromptError;
use crate::surface::{NullSurface, PromptView, RenderSurface};

/// プロンプトの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromptId(pub u64);

impl std::fmt::Display for PromptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "prompt-{}", self.0)
    }
}

/// 応答時に1回だけ呼ばれる継続
pub type Continuation = Box<dyn FnOnce() + Send>;

/// ユーザーの応答
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Join,
    Skip,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Join => "join",
            Decision::Skip => "skip",
        }
    }
}

/// 提示待ちのプロンプト
pub struct Prompt {
    id: PromptId,
    channel: String,
    info: Value,
    on_join: Option<Continuation>,
    on_skip: Option<Continuation>,
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Prompt {
    pub fn id(&self) -> PromptId {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn info(&self) -> &Value {
        &self.info
    }

    /// 応答に対応する継続を実行する（もう一方は破棄）
    fn resolve(mut self, decision: Decision) {
        let continuation = match decision {
            Decision::Join => self.on_join.take(),
            Decision::Skip => self.on_skip.take(),
        };
        if let Some(continuation) = continuation {
            continuation();
        }
    }
}

/// プロンプトキュー
pub struct PromptQueue {
    pending: VecDeque<Prompt>,
    current: Option<Prompt>,
    next_id: u64,
    surface: Arc<dyn RenderSurface>,
}

impl std::fmt::Debug for PromptQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptQueue")
            .field("current", &self.current)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Default for PromptQueue {
    fn default() -> Self {
        Self::new(Arc::new(NullSurface))
    }
}

impl PromptQueue {
    pub fn new(surface: Arc<dyn RenderSurface>) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            next_id: 1,
            surface,
        }
    }

    /// プロンプトを追加する
    ///
    /// 何も提示していなければ即座に提示する。
    pub fn enqueue<J, S>(
        &mut self,
        channel: impl Into<String>,
        info: Value,
        on_join: J,
        on_skip: S,
    ) -> PromptId
    where
        J: FnOnce() + Send + 'static,
        S: FnOnce() + Send + 'static,
    {
        let id = PromptId(self.next_id);
        self.next_id += 1;

        let prompt = Prompt {
            id,
            channel: channel.into(),
            info,
            on_join: Some(Box::new(on_join)),
            on_skip: Some(Box::new(on_skip)),
        };
        tracing::info!(
            prompt = %id,
            channel = %prompt.channel,
            "🔔 Prompt queued"
        );

        self.pending.push_back(prompt);
        self.dispatch();
        id
    }

    /// 提示中のプロンプトに応答する
    ///
    /// 対応する継続を1回だけ呼び、次のプロンプトを提示する。
    pub fn resolve(&mut self, decision: Decision) -> Result<PromptId, PromptError> {
        let Some(prompt) = self.current.take() else {
            tracing::warn!(
                decision = decision.as_str(),
                "⚠️ No prompt is being presented, ignoring decision"
            );
            return Err(PromptError::NothingPresented);
        };

        let id = prompt.id();
        tracing::info!(
            prompt = %id,
            channel = prompt.channel(),
            decision = decision.as_str(),
            "✅ Prompt resolved"
        );
        prompt.resolve(decision);

        self.dispatch();
        Ok(id)
    }

    fn dispatch(&mut self) {
        if self.current.is_some() {
            return;
        }
        let Some(prompt) = self.pending.pop_front() else {
            return;
        };

        let view = PromptView {
            id: prompt.id(),
            channel: prompt.channel().to_string(),
            info: prompt.info().clone(),
            waiting: self.pending.len(),
        };
        tracing::debug!(prompt = %view.id, waiting = view.waiting, "📣 Presenting prompt");
        self.current = Some(prompt);
        self.surface.present_prompt(&view);
    }

    /// 提示中のプロンプト
    pub fn current(&self) -> Option<&Prompt> {
        self.current.as_ref()
    }

    /// 提示待ちの件数（提示中は含まない）
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 提示中・提示待ちが共に無いかどうか
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }
}
