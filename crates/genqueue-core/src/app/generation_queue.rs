//! GenerationQueue - 呼び出し側に見える唯一の表面
//!
//! 全操作は同期的に呼べる。executor の実行だけが tokio runtime 上で走る。

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::{TaskId, TaskRequest};
use crate::error::SchedulerError;
use crate::queue::scheduler::SchedulerCore;
use crate::queue::{QueueSnapshot, Subscription, TaskRecord};

/// GenerationQueue は circuit breaker 付きの単一スロット FIFO queue
///
/// clone は安価で、clone 同士は同じ scheduler を共有する。
///
/// subscriber callback から queue を呼び返してよい。その呼び出しで生じた
/// snapshot は、配送中の snapshot のあとに届く。queue の clone を捕まえた
/// callback は、解除されるまで queue を生かし続ける。
#[derive(Clone)]
pub struct GenerationQueue {
    core: Arc<SchedulerCore>,
}

impl GenerationQueue {
    pub(crate) fn from_core(core: Arc<SchedulerCore>) -> Self {
        Self { core }
    }

    /// task を末尾に追加。何も走っておらず breaker が closed ならすぐ開始
    pub fn enqueue(&self, request: TaskRequest) -> Result<TaskId, SchedulerError> {
        self.core.enqueue(request)
    }

    /// pending task を cancel。不明 / 実行中 / 終了済みなら `false`
    pub fn cancel(&self, id: TaskId) -> bool {
        self.core.cancel(id)
    }

    /// pending をすべて cancel し、件数を返す。実行中の task はそのまま走らせる
    pub fn cancel_all(&self) -> usize {
        self.core.cancel_all()
    }

    /// pending を cancel し、終了済み record を捨てる。カウンターと breaker は保持
    pub fn clear(&self) {
        self.core.clear()
    }

    /// breaker を閉じ、連続失敗を 0 にして dispatch を再開
    pub fn reset_circuit_breaker(&self) {
        self.core.reset_circuit_breaker()
    }

    pub fn state(&self) -> QueueSnapshot {
        self.core.state()
    }

    /// 保持中 task の完全な record（payload と結果を含む）
    pub fn task(&self, id: TaskId) -> Option<TaskRecord> {
        self.core.task(id)
    }

    /// 以降に publish される snapshot を mutation 順に `callback` へ渡す
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&QueueSnapshot) + Send + Sync + 'static,
    {
        self.core.hub().subscribe(callback)
    }

    /// 最新の snapshot を `watch` channel として返す
    pub fn watch(&self) -> watch::Receiver<QueueSnapshot> {
        self.core.hub().watch()
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.hub().subscriber_count()
    }
}

impl std::fmt::Debug for GenerationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("GenerationQueue")
            .field("size", &state.size)
            .field("current_task_id", &state.current_task_id)
            .field("is_circuit_open", &state.is_circuit_open)
            .finish()
    }
}
