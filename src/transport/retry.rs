//! 再接続ポリシー

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 最大再接続試行回数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// 初回バックオフ（ミリ秒）
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// バックオフ上限（ミリ秒）
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;
/// ハンドシェイクのタイムアウト（ミリ秒）
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 20000;

/// 再接続設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 最大リトライ回数
    pub max_attempts: u32,
    /// 初期待機時間（ミリ秒）
    pub base_delay_ms: u64,
    /// 最大待機時間（ミリ秒）
    pub max_delay_ms: u64,
    /// ハンドシェイクのタイムアウト（ミリ秒）
    pub handshake_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }
}

impl RetryConfig {
    /// `attempt` 回目（1始まり）の試行前に待つ時間
    ///
    /// `base * 2^(attempt-1)` を `max_delay_ms` で打ち切る。
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// まだ試行可能かどうか
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 5000);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_backoff_sequence_is_capped() {
        let config = RetryConfig::default();
        let delays: Vec<u64> = (1..=6)
            .map(|attempt| config.delay_for(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000, 5000]);
    }

    #[test]
    fn test_large_attempts_do_not_overflow() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn test_attempt_ceiling() {
        let config = RetryConfig::default();
        assert!(config.allows(1));
        assert!(config.allows(10));
        assert!(!config.allows(11));
    }
}
