//! QueueBuilder - GenerationQueue の構築とワイヤリング
//!
//! 起動時検証（Fail-fast 設計）: 不正な設定や runtime の欠如は `build()` で
//! エラーにし、動き出してから壊れることがないようにする。

use std::sync::Arc;

use tokio::runtime::Handle;

use super::GenerationQueue;
use crate::config::{ConfigError, QueueConfig};
use crate::ports::{Clock, IdGenerator, SystemClock, TaskExecutor, UlidGenerator};
use crate::queue::scheduler::{SchedulerCore, SchedulerSettings};

/// QueueBuilder は [`GenerationQueue`] を組み立てる
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new(Arc::new(ComfyClient::new(url)))
///     .config(QueueConfig::load("genqueue.toml")?)
///     .build()?;
/// ```
pub struct QueueBuilder {
    executor: Arc<dyn TaskExecutor>,
    config: QueueConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    runtime: Option<Handle>,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no tokio runtime available; build inside a runtime or pass one with `runtime()`")]
    NoRuntime,
}

impl QueueBuilder {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            executor,
            config: QueueConfig::default(),
            clock: None,
            ids: None,
            runtime: None,
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// `config.breaker.failure_threshold` の簡易設定
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.breaker.failure_threshold = threshold;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// executor を走らせる runtime。省略時は現在の runtime
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// # 検証
    /// - `QueueConfig::validate()` が通ること
    /// - executor を走らせる tokio runtime があること
    pub fn build(self) -> Result<GenerationQueue, BuildError> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let settings = SchedulerSettings {
            breaker: self.config.breaker.clone(),
            default_timeout: self.config.default_timeout(),
            max_terminal_records: self.config.retention.max_terminal_records,
        };

        tracing::debug!(
            failure_threshold = settings.breaker.failure_threshold,
            default_timeout_ms = self.config.default_timeout_ms,
            max_terminal_records = settings.max_terminal_records,
            "generation queue built"
        );

        let core = SchedulerCore::new(settings, self.executor, clock, ids, runtime);
        Ok(GenerationQueue::from_core(core))
    }
}
