//! TaskStatus - task の状態遷移

use serde::{Deserialize, Serialize};

/// generation task のライフサイクル状態
///
/// 状態遷移:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed
/// - Pending -> Running -> Timeout
/// - Pending -> Cancelled
///
/// 終端状態からは遷移しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// FIFO で待機中
    Pending,

    /// executor に渡され、実行スロットを占有中
    Running,

    /// executor が結果を返した
    Completed,

    /// executor がエラーを返した
    Failed,

    /// 実行前に queue から外された
    Cancelled,

    /// executor が終わる前に budget が尽きた
    Timeout,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout
        )
    }

    /// cancel できるのは待機中の task だけ（実行中は executor のもの）
    pub fn is_cancellable(self) -> bool {
        matches!(self, TaskStatus::Pending)
    }

    /// circuit breaker の失敗として数えるか
    pub fn is_failure(self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Timeout)
    }
}
