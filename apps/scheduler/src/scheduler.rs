//! Reconciles live triggers with the persisted task definitions
//!
//! Every mutation goes through the same async operation lock so the
//! registry and the store always move together. Only active tasks have a
//! live trigger; each trigger is a tokio worker that sleeps until the next
//! fire time in the task's timezone and spawns a detached run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::jobs::TaskHandlers;
use crate::log_sink;
use crate::models::{
    ExecutionPage, LogContent, NewTask, RunReport, TaskDefinition, TaskFailure, TaskStatus,
    TaskStatusView,
};
use crate::registry::{LiveTrigger, TaskRegistry};
use crate::runner::{RunTrigger, TaskRunner};
use crate::schedule::Schedule;
use crate::store::TaskStore;

/// Default page size for execution history
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size accepted for execution history
pub const MAX_PAGE_SIZE: u32 = 100;

/// Owner of the live trigger registry
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    registry: TaskRegistry,
    runner: TaskRunner,
    handlers: TaskHandlers,
    op_lock: Mutex<()>,
    log_root: PathBuf,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.registry)
            .field("handlers", &self.handlers)
            .field("log_root", &self.log_root)
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler; nothing is armed until [`Scheduler::load_all`]
    pub fn new(
        store: Arc<dyn TaskStore>,
        handlers: TaskHandlers,
        log_root: impl Into<PathBuf>,
    ) -> Self {
        let runner = TaskRunner::new(store.clone(), handlers.clone());
        Self {
            store,
            registry: TaskRegistry::new(),
            runner,
            handlers,
            op_lock: Mutex::new(()),
            log_root: log_root.into(),
        }
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    pub fn handlers(&self) -> &TaskHandlers {
        &self.handlers
    }

    /// Rebuild the registry from the store
    ///
    /// Fails execution records left running by an earlier process, stops
    /// every live trigger and arms one per active definition. Returns the
    /// number of triggers armed.
    ///
    /// # Errors
    /// `SchedulerError::UnknownTask` if a stored id has no handler; the
    /// registry is left untouched in that case.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> SchedulerResult<usize> {
        let _op = self.op_lock.lock().await;

        let tasks = self.store.list_tasks().await?;
        if let Some(unknown) = tasks.iter().find(|t| !self.handlers.contains(&t.id)) {
            return Err(SchedulerError::UnknownTask(unknown.id.clone()));
        }

        let interrupted = self
            .store
            .fail_interrupted_executions(
                &self.runner.running_task_ids(),
                &TaskFailure::interrupted(),
                Utc::now(),
            )
            .await?;
        if interrupted > 0 {
            warn!(interrupted, "Closed executions left running by an earlier process");
        }

        let stopped = self.registry.clear();
        let mut armed = 0;
        for task in &tasks {
            if task.is_active() {
                if self.arm(task).await {
                    armed += 1;
                }
            } else if task.next_run_at.is_some() {
                if let Err(e) = self.store.set_next_run(&task.id, None).await {
                    e.log();
                }
            }
        }

        info!(
            total = tasks.len(),
            armed,
            stopped,
            "Loaded scheduled tasks"
        );
        Ok(armed)
    }

    /// Arm a trigger for a definition
    ///
    /// Returns false, after logging, if the definition is paused or its
    /// schedule does not compile.
    pub async fn schedule(&self, task: &TaskDefinition) -> bool {
        let _op = self.op_lock.lock().await;
        if !task.is_active() {
            self.registry.remove(&task.id);
            debug!(task_id = %task.id, "Not scheduling paused task");
            return false;
        }
        self.arm(task).await
    }

    /// Create a definition and arm it if active
    ///
    /// # Errors
    /// - `SchedulerError::InvalidInput` for a blank id or name
    /// - `SchedulerError::UnknownTask` if no handler exists for the id
    /// - `SchedulerError::InvalidSchedule` / `UnknownTimezone` for a bad schedule
    /// - `SchedulerError::DuplicateTask` if the id is taken
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn create(&self, task: NewTask) -> SchedulerResult<TaskDefinition> {
        let id = task.id.trim().to_string();
        if id.is_empty() {
            return Err(SchedulerError::InvalidInput("task id cannot be empty".to_string()));
        }
        if task.name.trim().is_empty() {
            return Err(SchedulerError::InvalidInput("task name cannot be empty".to_string()));
        }
        if !self.handlers.contains(&id) {
            return Err(SchedulerError::UnknownTask(id));
        }

        let schedule = Schedule::parse(&task.expression, &task.timezone)?;
        let next_run_at = match task.status {
            TaskStatus::Active => Some(schedule.next_from_now()?),
            TaskStatus::Paused => None,
        };

        let log_directory = match &task.log_directory {
            Some(dir) if !dir.trim().is_empty() => dir.trim().to_string(),
            _ => self.log_root.join(&id).to_string_lossy().into_owned(),
        };

        let task = NewTask {
            id,
            expression: schedule.expression().to_string(),
            timezone: schedule.timezone().to_string(),
            ..task
        };

        let _op = self.op_lock.lock().await;
        let created = self
            .store
            .create_task(&task, &log_directory, next_run_at)
            .await?;

        if created.is_active() {
            self.arm(&created).await;
        }

        info!(
            task_id = %created.id,
            expression = %created.expression,
            timezone = %created.timezone,
            status = ?created.status,
            "Created task"
        );
        Ok(created)
    }

    /// Pause a task; idempotent
    #[instrument(skip(self))]
    pub async fn pause(&self, id: &str) -> SchedulerResult<TaskDefinition> {
        let _op = self.op_lock.lock().await;
        let task = self.require(id).await?;

        self.registry.remove(id);
        if task.status == TaskStatus::Paused {
            return Ok(task);
        }

        let paused = self
            .store
            .set_status(id, TaskStatus::Paused, None)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;

        info!(task_id = %id, "Paused task");
        Ok(paused)
    }

    /// Resume a task; idempotent
    #[instrument(skip(self))]
    pub async fn resume(&self, id: &str) -> SchedulerResult<TaskDefinition> {
        let _op = self.op_lock.lock().await;
        let task = self.require(id).await?;

        if task.is_active() && self.registry.contains(id) {
            return Ok(task);
        }

        let next = Schedule::for_task(&task)?.next_from_now()?;
        let resumed = self
            .store
            .set_status(id, TaskStatus::Active, Some(next))
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;

        self.arm(&resumed).await;
        info!(task_id = %id, next_run_at = %next, "Resumed task");
        Ok(resumed)
    }

    /// Change a task's expression and timezone
    ///
    /// The new schedule is validated before anything is touched.
    #[instrument(skip(self))]
    pub async fn update_schedule(
        &self,
        id: &str,
        expression: &str,
        timezone: &str,
    ) -> SchedulerResult<TaskDefinition> {
        let schedule = Schedule::parse(expression, timezone)?;

        let _op = self.op_lock.lock().await;
        let task = self.require(id).await?;

        let next = if task.is_active() {
            Some(schedule.next_from_now()?)
        } else {
            None
        };

        self.registry.remove(id);
        let updated = self
            .store
            .update_schedule(id, schedule.expression(), schedule.timezone(), next)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;

        if updated.is_active() {
            self.arm(&updated).await;
        }

        info!(
            task_id = %id,
            expression = %updated.expression,
            timezone = %updated.timezone,
            "Updated task schedule"
        );
        Ok(updated)
    }

    /// Remove a task, its trigger and its execution history
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> SchedulerResult<()> {
        let _op = self.op_lock.lock().await;

        self.registry.remove(id);
        if !self.store.delete_task(id).await? {
            return Err(SchedulerError::TaskNotFound(id.to_string()));
        }

        info!(task_id = %id, "Deleted task");
        Ok(())
    }

    /// Run a task now, outside its cron schedule
    ///
    /// # Errors
    /// - `SchedulerError::TaskNotFound` if the task does not exist
    /// - `SchedulerError::TaskPaused` if the task is paused
    #[instrument(skip(self))]
    pub async fn run_now(&self, id: &str) -> SchedulerResult<RunReport> {
        let task = self.require(id).await?;
        if !task.is_active() {
            return Err(SchedulerError::TaskPaused(id.to_string()));
        }
        Ok(self.runner.run(id, RunTrigger::Manual).await)
    }

    /// Every definition with whether it has a live trigger
    pub async fn list_status(&self) -> SchedulerResult<Vec<TaskStatusView>> {
        let tasks = self.store.list_tasks().await?;
        Ok(tasks
            .into_iter()
            .map(|task| {
                let scheduled = self.registry.contains(&task.id);
                TaskStatusView { task, scheduled }
            })
            .collect())
    }

    /// One page of a task's execution history, newest first
    ///
    /// `page` starts at 1; `page_size` defaults to 20 and is capped at 100.
    pub async fn executions(
        &self,
        id: &str,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> SchedulerResult<ExecutionPage> {
        self.require(id).await?;

        let page = page.unwrap_or(1).max(1);
        let page_size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page - 1) * i64::from(page_size);

        let items = self
            .store
            .list_executions(id, i64::from(page_size), offset)
            .await?;
        let total = self.store.count_executions(id).await?;

        Ok(ExecutionPage {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Log content for an execution, synthesized when the file is gone
    pub async fn read_log(&self, execution_id: i64) -> SchedulerResult<LogContent> {
        let record = self.store.get_execution(execution_id).await?;
        Ok(log_sink::read_log(execution_id, record.as_ref()).await)
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    /// Expression and timezone the live trigger was compiled from
    pub fn live_schedule(&self, id: &str) -> Option<(String, String)> {
        self.registry.schedule_of(id)
    }

    /// Ids with a live trigger, sorted
    pub fn live_task_ids(&self) -> Vec<String> {
        self.registry.task_ids()
    }

    /// Stop every trigger; runs already in progress finish on their own
    pub async fn shutdown(&self) -> usize {
        let _op = self.op_lock.lock().await;
        let stopped = self.registry.clear();
        info!(stopped, "Scheduler stopped");
        stopped
    }

    async fn require(&self, id: &str) -> SchedulerResult<TaskDefinition> {
        self.store
            .get_task(id)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    /// Compile, register and persist the next fire time; caller holds the
    /// operation lock
    async fn arm(&self, task: &TaskDefinition) -> bool {
        let schedule = match Schedule::for_task(task) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Cannot schedule task");
                return false;
            }
        };
        let next = match schedule.next_from_now() {
            Ok(next) => next,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Schedule never fires");
                return false;
            }
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(trigger_loop(
            task.id.clone(),
            schedule.clone(),
            self.runner.clone(),
            cancel.clone(),
        ));
        self.registry.insert(
            task.id.clone(),
            LiveTrigger::new(cancel, handle, schedule.expression(), schedule.timezone()),
        );

        if let Err(e) = self.store.set_next_run(&task.id, Some(next)).await {
            e.log();
        }

        debug!(
            task_id = %task.id,
            expression = %schedule.expression(),
            timezone = %schedule.timezone(),
            next_run_at = %next,
            "Armed trigger"
        );
        true
    }
}

/// Sleep until each fire time and spawn a detached run
async fn trigger_loop(
    task_id: String,
    schedule: Schedule,
    runner: TaskRunner,
    cancel: CancellationToken,
) {
    let mut last_fire: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        let from = match last_fire {
            Some(fired) if fired > now => fired,
            _ => now,
        };
        let next = match schedule.next_after(from) {
            Ok(next) => next,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Trigger stopped");
                return;
            }
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(task_id = %task_id, "Trigger cancelled");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        last_fire = Some(next);
        let runner = runner.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            let report = runner.run(&id, RunTrigger::Cron).await;
            debug!(task_id = %id, success = report.success, message = %report.message, "Cron run finished");
        });
    }
}
