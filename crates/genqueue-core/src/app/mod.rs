//! App - アプリケーション層
//!
//! queue の部品と ports を組み合わせて、呼び出し側に見える API を提供します。
//!
//! # 主要コンポーネント
//! - **QueueBuilder**: 設定の検証とワイヤリング
//! - **GenerationQueue**: enqueue / cancel / subscribe などの操作面

pub mod builder;
pub mod generation_queue;

pub use self::builder::{BuildError, QueueBuilder};
pub use self::generation_queue::GenerationQueue;
