//! Domain - ドメインモデル（ids, task, errors）
//!
//! queue や lock のことは知らない。呼び出し元・scheduler・executor の間を
//! 流れるただの値。

pub mod errors;
pub mod ids;
pub mod task;

pub use errors::{ErrorKind, ExecutionError};
pub use ids::{Id, IdMarker, TaskId};
pub use task::{TaskEnvelope, TaskKind, TaskRequest};
