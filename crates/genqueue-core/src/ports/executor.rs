//! TaskExecutor port - generation backend クライアントの抽象化
//!
//! scheduler は task を 1 件ずつ executor に渡し、終わるのを待つ。backend を
//! どう呼ぶか（HTTP, websocket, ローカルプロセス）は実装側の責務。

use async_trait::async_trait;

use crate::domain::{ExecutionError, TaskEnvelope};

/// TaskExecutor は generation task を 1 件実行する
///
/// # 契約
/// - 1 回の呼び出しにつき、backend の結果かエラーでちょうど 1 回終わる
/// - `task.timeout()` は scheduler が課す budget。期限が来たら scheduler は
///   この future を abort して先へ進む。外部リソースを持つ実装は drop 時に
///   後始末すること
///
/// # 使用例
/// ```ignore
/// struct ComfyClient { /* ... */ }
///
/// #[async_trait]
/// impl TaskExecutor for ComfyClient {
///     async fn execute(&self, task: TaskEnvelope) -> Result<serde_json::Value, ExecutionError> {
///         let prompt_id = self.submit(task.payload()).await?;
///         self.wait_for_outputs(prompt_id).await
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: TaskEnvelope) -> Result<serde_json::Value, ExecutionError>;
}
