//! Ports - 抽象化レイヤー
//!
//! 外部システム（generation backend, 時刻, ID 採番）へのインターフェース。
//! Scheduler はこれらの trait だけに依存し、実装の詳細を知らない。

pub mod clock;
pub mod executor;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::TaskExecutor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
