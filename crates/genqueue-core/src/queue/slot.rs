//! ExecutionSlot - 唯一の実行スロット

use crate::domain::TaskId;

/// 何も走っていないか、ちょうど 1 件だけ走っているか
///
/// dispatch の判断はすべてこの値を読み書きするので、「実行中は高々 1 件」は
/// 数えるのではなく構造で成り立つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ExecutionSlot {
    #[default]
    Idle,
    Busy(TaskId),
}

impl ExecutionSlot {
    pub fn is_busy(&self) -> bool {
        matches!(self, ExecutionSlot::Busy(_))
    }

    pub fn current(&self) -> Option<TaskId> {
        match self {
            ExecutionSlot::Idle => None,
            ExecutionSlot::Busy(id) => Some(*id),
        }
    }

    pub fn holds(&self, task_id: TaskId) -> bool {
        self.current() == Some(task_id)
    }

    /// スロットを占有する。呼び出し側が先に `is_busy` を確認する
    pub fn occupy(&mut self, task_id: TaskId) {
        debug_assert!(!self.is_busy(), "execution slot already occupied");
        *self = ExecutionSlot::Busy(task_id);
    }

    pub fn release(&mut self) -> Option<TaskId> {
        std::mem::take(self).current()
    }
}
