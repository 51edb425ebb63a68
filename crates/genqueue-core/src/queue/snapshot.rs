//! QueueSnapshot - subscriber と `state()` に渡す不変の時点ビュー

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{QueueStats, TaskRecord, TaskStatus};
use crate::domain::{TaskId, TaskKind};

/// breaker が open になる前でも backend を failing と見なす連続失敗数
pub const FAILING_STREAK: u32 = 3;

/// 1 回の mutation 時点の scheduler 状態
///
/// 所有データのみ。snapshot を持ち続けても scheduler を block しない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// broadcast 番号。publish のたびに 1 ずつ増える
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,

    /// pending + running
    pub size: usize,
    pub is_running: bool,
    pub current_task_id: Option<TaskId>,

    pub is_circuit_open: bool,
    pub consecutive_failures: u32,

    pub stats: QueueStats,

    /// dispatch される順の pending id
    pub pending_ids: Vec<TaskId>,

    /// 保持中の全 task（実行前後とも）、enqueue 順
    pub tasks: Vec<TaskSummary>,
}

/// QueueHealth はインジケーター向けの大まかな健全性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueHealth {
    Healthy,
    Degraded,
    Failing,
}

impl QueueSnapshot {
    pub fn pending_count(&self) -> usize {
        self.pending_ids.len()
    }

    pub fn health(&self) -> QueueHealth {
        if self.is_circuit_open || self.consecutive_failures >= FAILING_STREAK {
            QueueHealth::Failing
        } else if self.consecutive_failures > 0 {
            QueueHealth::Degraded
        } else {
            QueueHealth::Healthy
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskSummary> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// payload を含まない TaskRecord のビュー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&TaskRecord> for TaskSummary {
    fn from(record: &TaskRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind.clone(),
            status: record.status,
            error: record.error.clone(),
            enqueued_at: record.enqueued_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }
}
