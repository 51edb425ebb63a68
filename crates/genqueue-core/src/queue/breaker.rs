//! Circuit breaker - 連続失敗によるディスパッチ停止
//!
//! # 状態遷移
//!
//! ```text
//! Closed --[consecutive failures >= threshold]--> Open
//! Open   --[reset()]-------------------------->  Closed
//! ```
//!
//! Open はラッチされる。half-open の試行も時間経過による回復もなく、
//! 一度 open になったらオペレーターの reset だけが新しい task の開始を許す。

use serde::{Deserialize, Serialize};

/// breaker を open にする連続失敗数のデフォルト
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// CircuitBreakerConfig は breaker の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// open にする連続失敗 / timeout の数（1 以上）
    pub failure_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// CircuitState は breaker の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// 新しい task を開始できる
    Closed,
    /// reset まで dispatch を停止
    Open,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive_failures: u32,
    state: CircuitState,
}

impl CircuitBreaker {
    /// `threshold` は最低 1 に丸める（0 は config の validate で先に弾かれる）
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            threshold: config.failure_threshold.max(1),
            consecutive_failures: 0,
            state: CircuitState::Closed,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
    }

    /// この失敗で breaker が open になったら `true`
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.state == CircuitState::Closed && self.consecutive_failures >= self.threshold {
            self.state = CircuitState::Open;
            tracing::warn!(
                consecutive_failures = self.consecutive_failures,
                threshold = self.threshold,
                "Circuit breaker OPENED - dispatch suspended until reset"
            );
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        let was = self.state;
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
        tracing::info!(previous = ?was, "Circuit breaker reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(&CircuitBreakerConfig {
            failure_threshold: threshold,
        })
    }

    #[rstest]
    #[case::k1(1)]
    #[case::k3(3)]
    #[case::k5(5)]
    fn opens_exactly_at_threshold(#[case] k: u32) {
        let mut cb = breaker(k);
        for _ in 0..k - 1 {
            assert!(!cb.record_failure());
        }
        assert!(!cb.is_open());

        assert!(cb.record_failure());
        assert!(cb.is_open());
        assert_eq!(cb.consecutive_failures(), k);
    }

    #[test]
    fn success_resets_the_streak() {
        let mut cb = breaker(3);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();

        assert!(!cb.is_open());
        assert_eq!(cb.consecutive_failures(), 2);
    }

    #[test]
    fn open_is_latched_until_reset() {
        let mut cb = breaker(1);
        assert!(cb.record_failure());

        // further failures keep counting but do not "re-open"
        assert!(!cb.record_failure());
        assert_eq!(cb.consecutive_failures(), 2);
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let mut cb = breaker(0);
        assert_eq!(cb.threshold(), 1);
        assert!(cb.record_failure());
    }
}
