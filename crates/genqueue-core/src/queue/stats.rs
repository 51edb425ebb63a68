//! QueueStats - カウンターと逐次平均

use serde::{Deserialize, Serialize};

/// scheduler の生存期間を通した集計
///
/// カウンターは増える一方で、古い record の prune でも減らない。
/// 2 つの平均は 1 サンプルずつ畳み込むので task ごとの履歴は持たない。
/// サンプル集合は実行して終わった task（completed / failed / timeout）で、
/// 件数はちょうど `total_completed + total_failed`。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_queued: u64,
    pub total_completed: u64,

    /// executor の失敗と timeout の合計
    pub total_failed: u64,

    /// `total_failed` のうち timeout の件数
    pub total_timed_out: u64,

    pub total_cancelled: u64,

    /// `started_at - enqueued_at` の平均
    pub average_wait_time_ms: f64,

    /// `completed_at - started_at` の平均
    pub average_execution_time_ms: f64,
}

impl QueueStats {
    pub(crate) fn record_enqueued(&mut self) {
        self.total_queued += 1;
    }

    pub(crate) fn record_cancelled(&mut self, count: u64) {
        self.total_cancelled += count;
    }

    pub(crate) fn record_completed(&mut self, wait_ms: f64, execution_ms: f64) {
        self.total_completed += 1;
        self.fold_sample(wait_ms, execution_ms);
    }

    pub(crate) fn record_failed(&mut self, wait_ms: f64, execution_ms: f64) {
        self.total_failed += 1;
        self.fold_sample(wait_ms, execution_ms);
    }

    pub(crate) fn record_timed_out(&mut self, wait_ms: f64, execution_ms: f64) {
        self.total_failed += 1;
        self.total_timed_out += 1;
        self.fold_sample(wait_ms, execution_ms);
    }

    /// このサンプルのカウンターを増やしたあとに呼ぶ
    fn fold_sample(&mut self, wait_ms: f64, execution_ms: f64) {
        let n = self.settled();
        self.average_wait_time_ms = incremental_mean(self.average_wait_time_ms, wait_ms, n);
        self.average_execution_time_ms =
            incremental_mean(self.average_execution_time_ms, execution_ms, n);
    }

    /// 実行して結果が出た task 数（成功・失敗・timeout）
    pub fn settled(&self) -> u64 {
        self.total_completed + self.total_failed
    }

    /// 終端状態に達した task 数
    pub fn finished(&self) -> u64 {
        self.settled() + self.total_cancelled
    }

    /// completed / settled。まだ何も終わっていなければ `None`
    pub fn success_rate(&self) -> Option<f64> {
        match self.settled() {
            0 => None,
            n => Some(self.total_completed as f64 / n as f64),
        }
    }
}

/// `old + (sample - old) / n`（`n` は新しいサンプルを含む件数）
pub(crate) fn incremental_mean(old: f64, sample: f64, n: u64) -> f64 {
    if n == 0 {
        return old;
    }
    old + (sample - old) / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_mean_matches_arithmetic_mean() {
        let samples = [120.0, 3400.5, 15.0, 0.0, 987.25, 42.0, 1_000_000.0];

        let mut mean = 0.0;
        for (i, s) in samples.iter().enumerate() {
            mean = incremental_mean(mean, *s, i as u64 + 1);
        }

        let expected = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((mean - expected).abs() < 1e-6, "{mean} vs {expected}");
    }

    #[test]
    fn averages_cover_completed_failed_and_timed_out() {
        let mut stats = QueueStats::default();
        stats.record_completed(10.0, 100.0);
        stats.record_failed(20.0, 200.0);
        stats.record_timed_out(30.0, 300.0);

        assert_eq!(stats.total_completed, 1);
        assert_eq!(stats.total_failed, 2);
        assert_eq!(stats.total_timed_out, 1);
        assert!((stats.average_wait_time_ms - 20.0).abs() < 1e-9);
        assert!((stats.average_execution_time_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn cancellations_do_not_move_averages() {
        let mut stats = QueueStats::default();
        stats.record_completed(50.0, 500.0);
        stats.record_cancelled(3);

        assert_eq!(stats.total_cancelled, 3);
        assert_eq!(stats.average_wait_time_ms, 50.0);
        assert_eq!(stats.average_execution_time_ms, 500.0);
        assert_eq!(stats.finished(), 4);
    }

    #[test]
    fn success_rate_is_none_until_something_settles() {
        let mut stats = QueueStats::default();
        stats.record_enqueued();
        assert_eq!(stats.success_rate(), None);

        stats.record_completed(0.0, 0.0);
        stats.record_failed(0.0, 0.0);
        stats.record_completed(0.0, 0.0);
        stats.record_completed(0.0, 0.0);
        assert_eq!(stats.success_rate(), Some(0.75));
    }
}
