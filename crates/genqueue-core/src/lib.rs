//! genqueue-core
//!
//! 遅い generation backend（画像・動画・keyframe 生成）向けの単一スロット
//! task queue。ラッチ式の circuit breaker 付き。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, errors）
//! - **ports**: 抽象化レイヤー（TaskExecutor, Clock, IdGenerator）
//! - **queue**: スケジューラ本体（record, stats, breaker, snapshot, hub）
//! - **app**: 構築と操作面（QueueBuilder, GenerationQueue）
//! - **impls**: 開発・テスト用実装（ScriptedExecutor）
//! - **config**: TOML + 環境変数による設定
//!
//! # 使用例
//! ```ignore
//! let queue = QueueBuilder::new(Arc::new(backend)).build()?;
//! let _sub = queue.subscribe(|s| println!("size={} open={}", s.size, s.is_circuit_open));
//! let id = queue.enqueue(TaskRequest::new("keyframe", json!({ "prompt": "..." })))?;
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;

pub use app::{BuildError, GenerationQueue, QueueBuilder};
pub use config::{ConfigError, QueueConfig};
pub use domain::{ExecutionError, TaskId, TaskKind, TaskRequest};
pub use error::SchedulerError;
pub use ports::TaskExecutor;
pub use queue::{QueueHealth, QueueSnapshot, QueueStats, Subscription, TaskStatus};
