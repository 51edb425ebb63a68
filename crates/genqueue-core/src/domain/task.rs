use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::TaskId;

/// TaskKind は generation リクエストの種別（"keyframe", "video", ...）
///
/// ログと識別のためだけに使い、scheduler はこれで分岐しない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKind(String);

impl TaskKind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// TaskRequest は `enqueue` に渡すリクエスト
///
/// `id` は任意。自前の記録と突き合わせたい呼び出し元は事前に決めてよく、
/// なければ scheduler が採番する。
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub id: Option<TaskId>,
    pub kind: TaskKind,
    pub payload: serde_json::Value,
    pub timeout: Option<Duration>,
}

impl TaskRequest {
    pub fn new(kind: impl Into<TaskKind>, payload: serde_json::Value) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            payload,
            timeout: None,
        }
    }

    /// 呼び出し側で id を決める。queue の生存期間中に一度でも使われた id は
    /// record が prune / clear 済みでも `DuplicateTaskId` で拒否される。
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// TaskKind + Payload (+ TaskId, budget) の“運搬用”データ。
///
/// executor から見た task で、ライフサイクル状態は持たない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    task_id: TaskId,
    kind: TaskKind,
    payload: serde_json::Value,
    timeout: Option<Duration>,
}

impl TaskEnvelope {
    pub fn new(
        task_id: TaskId,
        kind: TaskKind,
        payload: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            task_id,
            kind,
            payload,
            timeout,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// scheduler がこの実行に課す budget（あれば）
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
