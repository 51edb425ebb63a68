//! ScriptedExecutor - 開発・テスト用の executor
//!
//! 決めておいた結果を呼び出し順に 1 件ずつ再生する。本物の backend なしで
//! scheduler を決定的に動かすために使う。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::domain::{ExecutionError, TaskEnvelope, TaskId};
use crate::ports::TaskExecutor;
use crate::queue::lock;

/// Step は台本の 1 件分の結果
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(serde_json::Value),
    Fail(ExecutionError),
    /// （tokio の時間で）sleep してから内側の step を再生
    Delay(Duration, Box<Step>),
    /// 永遠に終わらない
    Hang,
    /// `ScriptedExecutor::release` を待ってから値で成功
    Gate(serde_json::Value),
}

impl Step {
    pub fn ok() -> Self {
        Step::Succeed(serde_json::Value::Null)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Step::Fail(ExecutionError::transient(message))
    }

    pub fn after(delay: Duration, step: Step) -> Self {
        Step::Delay(delay, Box::new(step))
    }
}

pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    started: Mutex<Vec<TaskId>>,
    gate: Semaphore,
}

impl ScriptedExecutor {
    /// 台本が尽きたら毎回 `Step::ok()` を再生
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Step::ok(),
            started: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
        }
    }

    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let exec = Self::new();
        lock(&exec.script).extend(steps);
        exec
    }

    pub fn with_fallback(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    pub fn push(&self, step: Step) {
        lock(&self.script).push_back(step);
    }

    /// `Step::Gate` の呼び出しを 1 件（現在または今後の）終わらせる
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// executor が呼ばれた順の task id
    pub fn started(&self) -> Vec<TaskId> {
        lock(&self.started).clone()
    }

    fn next_step(&self) -> Step {
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    async fn play(&self, mut step: Step) -> Result<serde_json::Value, ExecutionError> {
        loop {
            match step {
                Step::Succeed(value) => return Ok(value),
                Step::Fail(err) => return Err(err),
                Step::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                }
                Step::Hang => return std::future::pending().await,
                Step::Gate(value) => {
                    let permit = self
                        .gate
                        .acquire()
                        .await
                        .map_err(|e| ExecutionError::infrastructure(e.to_string()))?;
                    permit.forget();
                    return Ok(value);
                }
            }
        }
    }
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, task: TaskEnvelope) -> Result<serde_json::Value, ExecutionError> {
        lock(&self.started).push(task.task_id());
        let step = self.next_step();
        self.play(step).await
    }
}
