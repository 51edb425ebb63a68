//! Queue - スケジューラ本体
//!
//! # 含まれるもの
//! - **record / state**: task の記録と状態遷移
//! - **breaker / stats**: circuit breaker と統計
//! - **snapshot / hub**: snapshot と通知
//! - **scheduler**: 上記をまとめる scheduler core

mod breaker;
mod hub;
mod record;
pub(crate) mod scheduler;
mod slot;
mod snapshot;
mod state;
mod stats;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, DEFAULT_FAILURE_THRESHOLD};
pub use hub::{NotificationHub, Subscription};
pub use record::TaskRecord;
pub use snapshot::{FAILING_STREAK, QueueHealth, QueueSnapshot, TaskSummary};
pub use state::TaskStatus;
pub use stats::QueueStats;

pub(crate) use slot::ExecutionSlot;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// poison を無視する lock。どの critical section も panic し得る処理の前に
/// 状態を整合させている（subscriber callback は lock の外で走る）
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
