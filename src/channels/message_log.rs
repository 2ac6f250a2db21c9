//! チャンネルごとのメッセージログ
//!
//! 固定容量の循環バッファ。容量を超えたら最も古いメッセージから捨てる。

use std::collections::VecDeque;

use super::session::ChatMessage;

/// 1チャンネルあたりの保持件数
pub const DEFAULT_LOG_CAPACITY: usize = 2000;

/// 循環バッファによるメッセージログ
#[derive(Debug, Clone)]
pub struct MessageLog {
    /// メッセージを格納する循環バッファ
    buffer: VecDeque<ChatMessage>,
    /// 最大容量
    capacity: usize,
    /// 削除されたメッセージ数の累計
    dropped_count: usize,
    /// 総メッセージ数（削除されたものを含む）
    total_count: usize,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl MessageLog {
    /// 新しいログを作成（容量0は1に切り上げる）
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            dropped_count: 0,
            total_count: 0,
        }
    }

    /// メッセージを追加（容量を超えた場合は古いメッセージを削除）
    ///
    /// 削除した件数を返す。
    pub fn push(&mut self, message: ChatMessage) -> usize {
        self.buffer.push_back(message);
        self.total_count += 1;

        let mut evicted = 0;
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
            evicted += 1;
        }
        self.dropped_count += evicted;

        debug_assert!(self.buffer.len() <= self.capacity);
        evicted
    }

    /// 古い順にメッセージを走査
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, ChatMessage> {
        self.buffer.iter()
    }

    /// 最新のN件のメッセージを取得（古い順）
    pub fn recent(&self, n: usize) -> Vec<&ChatMessage> {
        let skip = self.buffer.len().saturating_sub(n);
        self.buffer.iter().skip(skip).collect()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.buffer.back()
    }

    /// 現在のメッセージ数
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 容量を取得
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 総メッセージ数（削除されたものを含む）
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// 削除されたメッセージ数
    pub fn dropped_count(&self) -> usize {
        self.dropped_count
    }
}
