use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use tokio::time::{Duration, sleep};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use genqueue_core::domain::TaskEnvelope;
use genqueue_core::{
    ExecutionError, GenerationQueue, QueueBuilder, QueueConfig, QueueSnapshot, TaskExecutor,
    TaskRequest,
};

/// Push a batch of simulated keyframe renders through the generation queue.
#[derive(Debug, Parser)]
#[command(name = "genqueue", version)]
struct Args {
    /// TOML config file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of keyframes to enqueue
    #[arg(long, default_value_t = 6)]
    keyframes: u32,

    /// How many of the first backend calls fail
    #[arg(long, default_value_t = 0)]
    failures: u32,

    /// Simulated render time per keyframe
    #[arg(long, default_value_t = 200)]
    latency_ms: u64,

    /// Per-task budget; overrides `default_timeout_ms` from the config
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct KeyframePayload {
    frame: u32,
    prompt: String,
}

/// 疑似 generation backend：最初の n 回は失敗する
struct SimulatedBackend {
    latency: Duration,
    remaining_failures: AtomicU32,
}

impl SimulatedBackend {
    fn new(latency: Duration, failures: u32) -> Self {
        Self {
            latency,
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl TaskExecutor for SimulatedBackend {
    async fn execute(&self, task: TaskEnvelope) -> Result<serde_json::Value, ExecutionError> {
        let p: KeyframePayload = serde_json::from_value(task.payload().clone())
            .map_err(|e| ExecutionError::permanent(format!("payload decode: {e}")))?;

        sleep(self.latency).await;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(ExecutionError::transient(format!(
                "backend unavailable (left={left})"
            )));
        }

        Ok(serde_json::json!({
            "image": format!("frame-{:03}.png", p.frame),
            "prompt": p.prompt,
        }))
    }
}

fn load_config(args: &Args) -> Result<QueueConfig> {
    let mut config = match &args.config {
        Some(path) => QueueConfig::load(path)?,
        None => QueueConfig::default(),
    }
    .apply_env_overrides()?;

    if let Some(ms) = args.timeout_ms {
        config.default_timeout_ms = Some(ms);
    }
    config.validate()?;
    Ok(config)
}

/// RUST_LOG があればそれを優先、なければ config の level
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_snapshot(s: &QueueSnapshot) {
    println!(
        "[{:>3}] size={} running={} open={} failures={} done={}/{} health={:?}",
        s.sequence,
        s.size,
        s.current_task_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
        s.is_circuit_open,
        s.consecutive_failures,
        s.stats.total_completed,
        s.stats.total_queued,
        s.health(),
    );
}

/// idle（pending も running もない）か breaker open になるまで待つ
async fn wait_idle_or_open(queue: &GenerationQueue) -> Result<QueueSnapshot> {
    let mut rx = queue.watch();
    let snapshot = rx
        .wait_for(|s| s.is_circuit_open || (s.size == 0 && !s.is_running))
        .await
        .context("queue dropped while waiting")?;
    Ok(snapshot.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args).context("loading queue config")?;
    init_tracing(&config.logging.level);

    let backend = Arc::new(SimulatedBackend::new(
        Duration::from_millis(args.latency_ms),
        args.failures,
    ));
    let queue = QueueBuilder::new(backend).config(config).build()?;
    let sub = queue.subscribe(print_snapshot);

    for frame in 0..args.keyframes {
        let id = queue.enqueue(TaskRequest::new(
            "keyframe",
            serde_json::json!({ "frame": frame, "prompt": format!("shot {frame}") }),
        ))?;
        tracing::debug!(task_id = %id, frame, "keyframe submitted");
    }

    // オペレーター役：breaker が開いたら少し待って reset
    loop {
        let snapshot = wait_idle_or_open(&queue).await?;
        if !snapshot.is_circuit_open {
            break;
        }
        tracing::warn!(
            pending = snapshot.pending_count(),
            "breaker open; resetting after cool-down"
        );
        sleep(Duration::from_millis(500)).await;
        queue.reset_circuit_breaker();
    }

    sub.unsubscribe();
    let stats = queue.state().stats;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
