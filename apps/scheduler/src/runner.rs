//! Execution lifecycle around a task body
//!
//! [`TaskRunner::run`] opens a log file and a running execution record,
//! invokes the handler in its own tokio task, and finishes the record as
//! completed or failed. The lifecycle itself runs on a spawned task, so a
//! caller that stops waiting does not leave the record running. It never returns an error: every outcome, including
//! a panicking body, comes back as a [`RunReport`].

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::jobs::{TaskHandler, TaskHandlers};
use crate::log_sink::LogSink;
use crate::models::{ExecutionOutcome, RunReport, TaskDefinition, TaskFailure};
use crate::schedule::next_run_for;
use crate::store::TaskStore;

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    Cron,
    Manual,
}

impl fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron => write!(f, "cron"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Handle given to a task body for one execution
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: String,
    execution_id: i64,
    started_at: DateTime<Utc>,
    log: Arc<LogSink>,
}

impl TaskContext {
    pub fn new(
        task_id: impl Into<String>,
        execution_id: i64,
        started_at: DateTime<Utc>,
        log: Arc<LogSink>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            execution_id,
            started_at,
            log,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn execution_id(&self) -> i64 {
        self.execution_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Append a progress line to this execution's log; never fails
    pub async fn write_log(&self, line: impl AsRef<str>) {
        self.log.write_log(line.as_ref()).await;
    }
}

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Marks a task as running until dropped
struct InFlightGuard {
    in_flight: InFlight,
    task_id: String,
}

impl InFlightGuard {
    fn acquire(in_flight: &InFlight, task_id: &str) -> Option<Self> {
        if !in_flight.lock().insert(task_id.to_string()) {
            return None;
        }
        Some(Self {
            in_flight: in_flight.clone(),
            task_id: task_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.task_id);
    }
}

/// Runs task bodies with logging and execution records
#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<dyn TaskStore>,
    handlers: TaskHandlers,
    in_flight: InFlight,
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("handlers", &self.handlers)
            .field("in_flight", &*self.in_flight.lock())
            .finish()
    }
}

impl TaskRunner {
    pub fn new(store: Arc<dyn TaskStore>, handlers: TaskHandlers) -> Self {
        Self {
            store,
            handlers,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a run of this task is in progress
    pub fn is_running(&self, task_id: &str) -> bool {
        self.in_flight.lock().contains(task_id)
    }

    /// Ids of tasks with a run in progress
    pub fn running_task_ids(&self) -> Vec<String> {
        self.in_flight.lock().iter().cloned().collect()
    }

    /// Run a task once
    #[instrument(skip(self, trigger), fields(trigger = %trigger))]
    pub async fn run(&self, task_id: &str, trigger: RunTrigger) -> RunReport {
        let task = match self.store.get_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(task_id = %task_id, "Run requested for unknown task");
                return RunReport::failed(format!("task not found: {}", task_id));
            }
            Err(e) => {
                e.log();
                return RunReport::failed(format!("failed to load task {}: {}", task_id, e));
            }
        };

        if !task.is_active() {
            info!(task_id = %task_id, "Task is paused, skipping run");
            return RunReport::noop(format!("task {} is paused", task_id));
        }

        let Some(guard) = InFlightGuard::acquire(&self.in_flight, task_id) else {
            info!(task_id = %task_id, "Task already running, skipping run");
            return RunReport::noop(format!("task {} is already running", task_id));
        };

        let Some(handler) = self.handlers.get(task_id) else {
            warn!(task_id = %task_id, "No handler registered");
            return RunReport::failed(format!("no handler registered for task: {}", task_id));
        };

        // Outlives the caller; the record is finished even if this future is dropped
        let runner = self.clone();
        let lifecycle = tokio::spawn(
            async move {
                let report = runner.execute(task, handler, trigger).await;
                drop(guard);
                report
            }
            .in_current_span(),
        );

        match lifecycle.await {
            Ok(report) => report,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Run lifecycle aborted");
                RunReport::failed(format!("run of {} aborted: {}", task_id, e))
            }
        }
    }

    async fn execute(
        &self,
        task: TaskDefinition,
        handler: Arc<dyn TaskHandler>,
        trigger: RunTrigger,
    ) -> RunReport {
        let task_id = task.id.as_str();
        let started_at = Utc::now();
        let log = Arc::new(LogSink::open(Path::new(&task.log_directory), task_id, started_at).await);

        let execution_id = match self
            .store
            .insert_execution(task_id, started_at, &log.path_string())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                e.log();
                log.write_log(&format!("Could not record execution: {}", e)).await;
                log.close().await;
                return RunReport::failed(format!("failed to record execution: {}", e));
            }
        };

        let ctx = TaskContext::new(task_id, execution_id, started_at, log.clone());
        ctx.write_log(format!(
            "Starting {} ({} run, execution {})",
            task.name, trigger, execution_id
        ))
        .await;

        let body_ctx = ctx.clone();
        let joined = tokio::spawn(async move { handler.run(&body_ctx).await }).await;

        let outcome = match joined {
            Ok(Ok(output)) => ExecutionOutcome::Completed(output),
            Ok(Err(e)) => {
                e.log(task_id);
                ExecutionOutcome::Failed(TaskFailure::from_error(&e))
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                warn!(task_id = %task_id, panic = %message, "Task body panicked");
                ExecutionOutcome::Failed(TaskFailure::panic(message))
            }
            Err(e) => ExecutionOutcome::Failed(TaskFailure::from_error(&e)),
        };

        let finished_at = Utc::now();
        match &outcome {
            ExecutionOutcome::Completed(_) => {
                ctx.write_log(format!("Completed: {}", outcome.message())).await
            }
            ExecutionOutcome::Failed(_) => {
                ctx.write_log(format!("Failed: {}", outcome.message())).await
            }
        }

        match self
            .store
            .finish_execution(execution_id, &outcome, finished_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(execution_id, "Execution was already finished"),
            Err(e) => e.log(),
        }

        self.record_run(task_id, started_at).await;
        log.close().await;

        debug!(
            task_id = %task_id,
            execution_id,
            status = ?outcome.status(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Run finished"
        );
        RunReport::from_outcome(execution_id, &outcome)
    }

    /// Stamp last run, run count and the next fire time
    async fn record_run(&self, task_id: &str, ran_at: DateTime<Utc>) {
        let next = match self.store.get_task(task_id).await {
            Ok(Some(task)) => next_run_for(&task),
            Ok(None) => return,
            Err(e) => {
                e.log();
                None
            }
        };

        if let Err(e) = self.store.record_run(task_id, ran_at, next).await {
            e.log();
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task body panicked".to_string()
    }
}
