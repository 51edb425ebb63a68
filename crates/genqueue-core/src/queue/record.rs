//! TaskRecord - リクエスト内容 + ライフサイクル状態

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::TaskStatus;
use crate::domain::{TaskEnvelope, TaskId, TaskKind};

/// 1 件の generation リクエストと、scheduler が知っているすべて
///
/// 設計:
/// - task 状態の "single source of truth"
/// - queue 側の構造（pending, slot）は TaskId だけを持つ
/// - 状態遷移はすべてここで行い、呼ぶのは scheduler だけ
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub payload: serde_json::Value,
    pub status: TaskStatus,

    /// 実行 budget（リクエスト指定、なければ設定のデフォルト）
    pub timeout: Option<Duration>,

    /// `Failed` / `Timeout` のときだけ入る
    pub error: Option<String>,

    /// executor の出力。`Completed` のときだけ入る
    pub result: Option<serde_json::Value>,

    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// 受付順。scheduler の生存期間を通して単調増加
    pub position: u64,
}

impl TaskRecord {
    pub(crate) fn new(
        id: TaskId,
        kind: TaskKind,
        payload: serde_json::Value,
        timeout: Option<Duration>,
        enqueued_at: DateTime<Utc>,
        position: u64,
    ) -> Self {
        Self {
            id,
            kind,
            payload,
            status: TaskStatus::Pending,
            timeout,
            error: None,
            result: None,
            enqueued_at,
            started_at: None,
            completed_at: None,
            position,
        }
    }

    pub(crate) fn start(&mut self, now: DateTime<Utc>) {
        debug_assert_eq!(self.status, TaskStatus::Pending);
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
    }

    pub(crate) fn complete(&mut self, now: DateTime<Utc>, result: serde_json::Value) {
        debug_assert_eq!(self.status, TaskStatus::Running);
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(now);
    }

    pub(crate) fn fail(&mut self, now: DateTime<Utc>, error: String) {
        debug_assert_eq!(self.status, TaskStatus::Running);
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
    }

    pub(crate) fn time_out(&mut self, now: DateTime<Utc>, error: String) {
        debug_assert_eq!(self.status, TaskStatus::Running);
        self.status = TaskStatus::Timeout;
        self.error = Some(error);
        self.completed_at = Some(now);
    }

    /// cancel された task では `completed_at` を「終端になった時刻」として使う
    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) {
        debug_assert_eq!(self.status, TaskStatus::Pending);
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(now);
    }

    /// executor から見たこの task
    pub fn envelope(&self) -> TaskEnvelope {
        TaskEnvelope::new(self.id, self.kind.clone(), self.payload.clone(), self.timeout)
    }

    /// `started_at - enqueued_at`（開始後のみ）
    pub fn wait_time_ms(&self) -> Option<f64> {
        self.started_at
            .map(|started| millis_between(self.enqueued_at, started))
    }

    /// `completed_at - started_at`（実行して終わったあとのみ）
    pub fn execution_time_ms(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(millis_between(started, completed)),
            _ => None,
        }
    }
}

/// `from` から `to` までのミリ秒。時計が戻った場合は 0 に丸める
fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    let ms = match delta.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => delta.num_milliseconds() as f64,
    };
    ms.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_at(enqueued_at: DateTime<Utc>) -> TaskRecord {
        TaskRecord::new(
            TaskId::from_ulid(ulid::Ulid::new()),
            TaskKind::new("keyframe"),
            serde_json::json!({"prompt": "a lighthouse at dusk"}),
            Some(Duration::from_secs(60)),
            enqueued_at,
            0,
        )
    }

    #[test]
    fn timings_follow_the_lifecycle() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut record = record_at(t0);

        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.wait_time_ms(), None);

        record.start(t0 + chrono::Duration::milliseconds(120));
        assert_eq!(record.wait_time_ms(), Some(120.0));
        assert_eq!(record.execution_time_ms(), None);

        record.complete(
            t0 + chrono::Duration::milliseconds(2120),
            serde_json::json!({"image": "out.png"}),
        );
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.execution_time_ms(), Some(2000.0));
        assert_eq!(record.error, None);
        assert!(record.result.is_some());
    }

    #[test]
    fn failure_and_timeout_record_error() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        let mut failed = record_at(t0);
        failed.start(t0);
        failed.fail(t0, "backend 500".to_string());
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("backend 500"));

        let mut timed_out = record_at(t0);
        timed_out.start(t0);
        timed_out.time_out(t0, "too slow".to_string());
        assert_eq!(timed_out.status, TaskStatus::Timeout);
        assert!(timed_out.result.is_none());
    }

    #[test]
    fn cancelled_task_never_started() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut record = record_at(t0);
        record.cancel(t0);

        assert_eq!(record.status, TaskStatus::Cancelled);
        assert_eq!(record.started_at, None);
        assert_eq!(record.wait_time_ms(), None);
        assert_eq!(record.execution_time_ms(), None);
    }

    #[test]
    fn clock_stepping_back_clamps_to_zero() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut record = record_at(t0);
        record.start(t0 - chrono::Duration::seconds(5));
        assert_eq!(record.wait_time_ms(), Some(0.0));
    }

    #[test]
    fn envelope_carries_budget() {
        let record = record_at(Utc::now());
        let env = record.envelope();
        assert_eq!(env.task_id(), record.id);
        assert_eq!(env.kind().as_str(), "keyframe");
        assert_eq!(env.timeout(), Some(Duration::from_secs(60)));
    }
}
