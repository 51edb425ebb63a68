//! Scheduler core - pending FIFO、実行スロット、完了処理
//!
//! # 構成
//! - **CoreState**: 可変状態をすべて持ち、状態遷移だけを行う（block / spawn / 通知はしない）
//! - **SchedulerCore**: CoreState を 1 つの mutex で包み、副作用（snapshot の publish、
//!   executor の起動）を担当する
//!
//! # ロック規律
//! - state lock を保持したまま await しない
//! - subscriber callback は state lock の外で走る（`hub` 参照）
//! - executor の起動は flush より先に行う。timeout の期限は dispatch 時点
//!   （= `started_at`）で確定し、callback の遅さに引きずられない

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::time::Instant;

use super::{
    CircuitBreaker, CircuitBreakerConfig, ExecutionSlot, NotificationHub, QueueSnapshot,
    QueueStats, TaskRecord, TaskStatus, TaskSummary, lock,
};
use crate::domain::{ExecutionError, TaskEnvelope, TaskId, TaskKind, TaskRequest};
use crate::error::SchedulerError;
use crate::ports::{Clock, IdGenerator, TaskExecutor};

/// 実行がどう終わったか（scheduler から見た結果）
#[derive(Debug)]
pub(crate) enum Settlement {
    Completed(serde_json::Value),
    Failed(ExecutionError),
    TimedOut { kind: TaskKind, budget: Duration },
}

/// `CoreState::settle` がログ用に返す要約
#[derive(Debug)]
pub(crate) struct Settled {
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub execution_ms: f64,
    pub error: Option<String>,
    pub breaker_opened: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SchedulerSettings {
    pub breaker: CircuitBreakerConfig,
    pub default_timeout: Option<Duration>,
    pub max_terminal_records: usize,
}

#[derive(Debug)]
pub(crate) struct CoreState {
    /// 保持中の record（single source of truth）
    records: HashMap<TaskId, TaskRecord>,

    /// これまでに受け付けた全 id。record が prune / clear されても残る
    admitted: HashSet<TaskId>,

    /// position -> id（enqueue 順の列挙用）
    order: BTreeMap<u64, TaskId>,

    pending: VecDeque<TaskId>,

    /// 終端状態の id（古い順）。prune の対象
    terminal: VecDeque<TaskId>,

    slot: ExecutionSlot,
    breaker: CircuitBreaker,
    stats: QueueStats,

    max_terminal_records: usize,
    next_position: u64,
    sequence: u64,
}

impl CoreState {
    pub fn new(settings: &SchedulerSettings) -> Self {
        Self {
            records: HashMap::new(),
            admitted: HashSet::new(),
            order: BTreeMap::new(),
            pending: VecDeque::new(),
            terminal: VecDeque::new(),
            slot: ExecutionSlot::Idle,
            breaker: CircuitBreaker::new(&settings.breaker),
            stats: QueueStats::default(),
            max_terminal_records: settings.max_terminal_records,
            next_position: 0,
            sequence: 0,
        }
    }

    /// 一度でも受け付けた id か（record が既に消えていても true）
    pub fn has_admitted(&self, id: TaskId) -> bool {
        self.admitted.contains(&id)
    }

    pub fn record(&self, id: TaskId) -> Option<&TaskRecord> {
        self.records.get(&id)
    }

    /// 新しい pending task を末尾に追加
    pub fn admit(
        &mut self,
        id: TaskId,
        kind: TaskKind,
        payload: serde_json::Value,
        timeout: Option<Duration>,
        now: DateTime<Utc>,
    ) {
        let position = self.next_position;
        self.next_position += 1;

        let record = TaskRecord::new(id, kind, payload, timeout, now, position);
        self.records.insert(id, record);
        self.admitted.insert(id);
        self.order.insert(position, id);
        self.pending.push_back(id);
        self.stats.record_enqueued();
    }

    /// スロットが空き、breaker が closed なら先頭 task を開始
    pub fn try_dispatch(&mut self, now: DateTime<Utc>) -> Option<TaskEnvelope> {
        if self.slot.is_busy() || self.breaker.is_open() {
            return None;
        }

        while let Some(id) = self.pending.pop_front() {
            let Some(record) = self.records.get_mut(&id) else {
                continue;
            };
            record.start(now);
            self.slot.occupy(id);
            return Some(record.envelope());
        }
        None
    }

    /// 実行結果を反映。`task_id` が実行中 task でなければ `None`
    pub fn settle(
        &mut self,
        task_id: TaskId,
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Option<Settled> {
        if !self.slot.holds(task_id) {
            return None;
        }
        self.slot.release();

        let record = self.records.get_mut(&task_id)?;

        match settlement {
            Settlement::Completed(result) => record.complete(now, result),
            Settlement::Failed(err) => record.fail(now, err.to_string()),
            Settlement::TimedOut { kind, budget } => {
                record.time_out(now, SchedulerError::Timeout { kind, budget }.to_string())
            }
        }

        let breaker_opened = if record.status.is_failure() {
            self.breaker.record_failure()
        } else {
            self.breaker.record_success();
            false
        };

        let wait_ms = record.wait_time_ms().unwrap_or(0.0);
        let execution_ms = record.execution_time_ms().unwrap_or(0.0);
        match record.status {
            TaskStatus::Completed => self.stats.record_completed(wait_ms, execution_ms),
            TaskStatus::Timeout => self.stats.record_timed_out(wait_ms, execution_ms),
            _ => self.stats.record_failed(wait_ms, execution_ms),
        }

        let settled = Settled {
            kind: record.kind.clone(),
            status: record.status,
            execution_ms,
            error: record.error.clone(),
            breaker_opened,
        };
        self.retire(task_id);
        Some(settled)
    }

    /// pending task を 1 件 cancel。不明 id / pending でない task は `false`
    pub fn cancel(&mut self, id: TaskId, now: DateTime<Utc>) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        if !record.status.is_cancellable() {
            return false;
        }
        let Some(index) = self.pending.iter().position(|p| *p == id) else {
            return false;
        };

        self.pending.remove(index);
        record.cancel(now);
        self.stats.record_cancelled(1);
        self.retire(id);
        true
    }

    /// pending をすべて cancel。実行中の task には触れない
    pub fn cancel_all(&mut self, now: DateTime<Utc>) -> usize {
        let drained: Vec<TaskId> = self.pending.drain(..).collect();
        for id in &drained {
            if let Some(record) = self.records.get_mut(id) {
                record.cancel(now);
            }
        }
        self.stats.record_cancelled(drained.len() as u64);
        for id in &drained {
            self.retire(*id);
        }
        drained.len()
    }

    /// pending を cancel し、終端 record の履歴を捨てる
    pub fn clear(&mut self, now: DateTime<Utc>) -> usize {
        let cancelled = self.cancel_all(now);
        for id in self.terminal.drain(..) {
            if let Some(record) = self.records.remove(&id) {
                self.order.remove(&record.position);
            }
        }
        cancelled
    }

    pub fn reset_breaker(&mut self) {
        self.breaker.reset();
    }

    /// `id` を終端として登録し、上限を超えた古いものから prune
    fn retire(&mut self, id: TaskId) {
        debug_assert!(self.records.get(&id).is_some_and(|r| r.status.is_terminal()));
        self.terminal.push_back(id);
        while self.terminal.len() > self.max_terminal_records {
            let Some(oldest) = self.terminal.pop_front() else {
                break;
            };
            if let Some(record) = self.records.remove(&oldest) {
                self.order.remove(&record.position);
            }
        }
    }

    /// publish 用の snapshot。sequence を進める
    pub fn next_snapshot(&mut self, now: DateTime<Utc>) -> QueueSnapshot {
        self.sequence += 1;
        self.snapshot(now)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> QueueSnapshot {
        QueueSnapshot {
            sequence: self.sequence,
            taken_at: now,
            size: self.pending.len() + usize::from(self.slot.is_busy()),
            is_running: self.slot.is_busy(),
            current_task_id: self.slot.current(),
            is_circuit_open: self.breaker.is_open(),
            consecutive_failures: self.breaker.consecutive_failures(),
            stats: self.stats,
            pending_ids: self.pending.iter().copied().collect(),
            tasks: self
                .order
                .values()
                .filter_map(|id| self.records.get(id))
                .map(TaskSummary::from)
                .collect(),
        }
    }
}

/// dispatch 直後の起動情報。deadline は `started_at` 時点で確定済み
pub(crate) struct Launch {
    envelope: TaskEnvelope,
    deadline: Option<Instant>,
}

/// Scheduler 本体：CoreState + collaborators
pub(crate) struct SchedulerCore {
    state: Mutex<CoreState>,
    hub: Arc<NotificationHub>,
    executor: Arc<dyn TaskExecutor>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    runtime: Handle,
    default_timeout: Option<Duration>,
}

impl SchedulerCore {
    pub fn new(
        settings: SchedulerSettings,
        executor: Arc<dyn TaskExecutor>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        runtime: Handle,
    ) -> Arc<Self> {
        let state = CoreState::new(&settings);
        let hub = NotificationHub::new(state.snapshot(clock.now()));
        Arc::new(Self {
            state: Mutex::new(state),
            hub,
            executor,
            clock,
            ids,
            runtime,
            default_timeout: settings.default_timeout,
        })
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn enqueue(self: &Arc<Self>, request: TaskRequest) -> Result<TaskId, SchedulerError> {
        if request.kind.is_blank() {
            return Err(SchedulerError::InvalidTask(
                "task kind must not be blank".to_string(),
            ));
        }
        let timeout = request.timeout.or(self.default_timeout);
        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(SchedulerError::InvalidTask(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let (id, launch) = {
            let mut state = lock(&self.state);
            let id = match request.id {
                Some(id) if state.has_admitted(id) => {
                    return Err(SchedulerError::DuplicateTaskId(id));
                }
                Some(id) => id,
                None => self.ids.generate_task_id(),
            };

            tracing::debug!(
                task_id = %id,
                kind = %request.kind,
                timeout_ms = timeout.map(|t| t.as_millis() as u64),
                "task enqueued"
            );
            state.admit(id, request.kind, request.payload, timeout, self.clock.now());
            self.publish(&mut state);
            (id, self.dispatch(&mut state))
        };

        if let Some(launch) = launch {
            self.launch(launch);
        }
        self.hub.flush();
        Ok(id)
    }

    pub fn cancel(&self, id: TaskId) -> bool {
        let cancelled = {
            let mut state = lock(&self.state);
            let cancelled = state.cancel(id, self.clock.now());
            if cancelled {
                tracing::debug!(task_id = %id, "task cancelled");
                self.publish(&mut state);
            }
            cancelled
        };

        if cancelled {
            self.hub.flush();
        }
        cancelled
    }

    pub fn cancel_all(&self) -> usize {
        let count = {
            let mut state = lock(&self.state);
            let count = state.cancel_all(self.clock.now());
            if count > 0 {
                tracing::info!(count, "pending tasks cancelled");
                self.publish(&mut state);
            }
            count
        };

        if count > 0 {
            self.hub.flush();
        }
        count
    }

    pub fn clear(&self) {
        {
            let mut state = lock(&self.state);
            let cancelled = state.clear(self.clock.now());
            tracing::info!(cancelled, "queue cleared");
            self.publish(&mut state);
        }
        self.hub.flush();
    }

    pub fn reset_circuit_breaker(self: &Arc<Self>) {
        let launch = {
            let mut state = lock(&self.state);
            state.reset_breaker();
            self.publish(&mut state);
            self.dispatch(&mut state)
        };

        if let Some(launch) = launch {
            self.launch(launch);
        }
        self.hub.flush();
    }

    pub fn state(&self) -> QueueSnapshot {
        lock(&self.state).snapshot(self.clock.now())
    }

    pub fn task(&self, id: TaskId) -> Option<TaskRecord> {
        lock(&self.state).record(id).cloned()
    }

    fn publish(&self, state: &mut CoreState) {
        let snapshot = state.next_snapshot(self.clock.now());
        self.hub.publish(snapshot);
    }

    /// dispatch を試みる。task が始まったら "running" snapshot を publish
    fn dispatch(&self, state: &mut CoreState) -> Option<Launch> {
        let envelope = state.try_dispatch(self.clock.now())?;
        let deadline = envelope.timeout().map(|budget| Instant::now() + budget);
        tracing::debug!(
            task_id = %envelope.task_id(),
            kind = %envelope.kind(),
            "task dispatched"
        );
        self.publish(state);
        Some(Launch { envelope, deadline })
    }

    /// executor を呼び出し元の stack から切り離して実行
    ///
    /// executor は専用 task で走り、期限は `deadline` に固定される。
    /// 期限切れなら実行を abort して次へ進む。
    fn launch(self: &Arc<Self>, launch: Launch) {
        let Launch { envelope, deadline } = launch;
        let core = Arc::clone(self);
        self.runtime.spawn(async move {
            let task_id = envelope.task_id();
            let kind = envelope.kind().clone();
            let budget = envelope.timeout();

            let executor = Arc::clone(&core.executor);
            let mut run = tokio::spawn(async move { executor.execute(envelope).await });

            let joined = match deadline.zip(budget) {
                Some((deadline, budget)) => match tokio::time::timeout_at(deadline, &mut run).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        run.abort();
                        core.settle(task_id, Settlement::TimedOut { kind, budget });
                        return;
                    }
                },
                None => run.await,
            };

            let settlement = match joined {
                Ok(Ok(result)) => Settlement::Completed(result),
                Ok(Err(err)) => Settlement::Failed(err),
                Err(join_err) => Settlement::Failed(ExecutionError::infrastructure(format!(
                    "executor aborted: {join_err}"
                ))),
            };
            core.settle(task_id, settlement);
        });
    }

    fn settle(self: &Arc<Self>, task_id: TaskId, settlement: Settlement) {
        let launch = {
            let mut state = lock(&self.state);
            let Some(settled) = state.settle(task_id, settlement, self.clock.now()) else {
                tracing::debug!(task_id = %task_id, "ignoring settlement for task not in the slot");
                return;
            };

            match settled.status {
                TaskStatus::Completed => tracing::info!(
                    task_id = %task_id,
                    kind = %settled.kind,
                    execution_ms = settled.execution_ms,
                    "task completed"
                ),
                status => tracing::warn!(
                    task_id = %task_id,
                    kind = %settled.kind,
                    status = ?status,
                    error = settled.error.as_deref().unwrap_or_default(),
                    breaker_opened = settled.breaker_opened,
                    "task failed"
                ),
            }

            self.publish(&mut state);
            self.dispatch(&mut state)
        };

        if let Some(launch) = launch {
            self.launch(launch);
        }
        self.hub.flush();
    }
}
