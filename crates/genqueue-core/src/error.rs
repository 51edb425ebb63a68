use std::time::Duration;

use thiserror::Error;

use crate::domain::{TaskId, TaskKind};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("duplicate task id {0}")]
    DuplicateTaskId(TaskId),

    /// budget を超えた task の record に残すエラー。`enqueue` の呼び出し元には
    /// 返らない。
    #[error("task_kind={kind} timed out after {}ms", .budget.as_millis())]
    Timeout { kind: TaskKind, budget: Duration },
}
