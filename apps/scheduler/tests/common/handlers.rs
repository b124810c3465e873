//! Task handlers with scripted behaviour

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use encore_scheduler::models::TaskOutput;
use encore_scheduler::{TaskContext, TaskHandler, WorkerError, WorkerResult};

/// Writes a log line, counts the call and succeeds
#[derive(Clone, Default)]
pub struct CountingHandler {
    pub runs: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub fn count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for CountingHandler {
    async fn run(&self, ctx: &TaskContext) -> WorkerResult<TaskOutput> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.write_log(format!("counting run {}", n)).await;
        Ok(TaskOutput::Message {
            message: format!("run {}", n),
        })
    }
}

/// Always returns an error
pub struct FailingHandler;

#[async_trait]
impl TaskHandler for FailingHandler {
    async fn run(&self, ctx: &TaskContext) -> WorkerResult<TaskOutput> {
        ctx.write_log("about to fail").await;
        Err(WorkerError::NotFound("fixture song".to_string()))
    }
}

/// Panics partway through
pub struct PanickingHandler;

#[async_trait]
impl TaskHandler for PanickingHandler {
    async fn run(&self, ctx: &TaskContext) -> WorkerResult<TaskOutput> {
        ctx.write_log("about to panic").await;
        panic!("handler exploded");
    }
}

/// Sleeps before succeeding
pub struct SlowHandler {
    pub delay: Duration,
}

#[async_trait]
impl TaskHandler for SlowHandler {
    async fn run(&self, ctx: &TaskContext) -> WorkerResult<TaskOutput> {
        ctx.write_log("sleeping").await;
        tokio::time::sleep(self.delay).await;
        Ok(TaskOutput::Message {
            message: "slow run done".to_string(),
        })
    }
}
