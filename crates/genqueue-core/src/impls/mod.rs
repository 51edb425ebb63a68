//! Impls - ports の開発用・テスト用実装
//!
//! # 含まれる実装
//! - **ScriptedExecutor**: 結果を順番に再生する TaskExecutor
//!
//! 本番の generation backend client はアプリケーション側で TaskExecutor を実装する。

pub mod scripted;

pub use self::scripted::{ScriptedExecutor, Step};
