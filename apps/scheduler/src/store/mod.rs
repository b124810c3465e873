//! Durable storage for task definitions and execution history
//!
//! [`TaskStore`] is the seam between the scheduler and its database of
//! record. [`PgTaskStore`] backs production; [`MemoryTaskStore`] keeps the
//! same semantics in process for tests and local runs.

mod memory;
mod postgres;

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SchedulerResult;
use crate::models::{ExecutionOutcome, ExecutionRecord, NewTask, TaskDefinition, TaskFailure, TaskStatus};

/// Persistence operations used by the scheduler and runner
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Every definition, ordered by id
    async fn list_tasks(&self) -> SchedulerResult<Vec<TaskDefinition>>;

    async fn get_task(&self, id: &str) -> SchedulerResult<Option<TaskDefinition>>;

    /// Insert a new definition
    ///
    /// # Errors
    /// `SchedulerError::DuplicateTask` if the id is taken.
    async fn create_task(
        &self,
        task: &NewTask,
        log_directory: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<TaskDefinition>;

    /// Set status and next fire time; `None` if the task does not exist
    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<Option<TaskDefinition>>;

    /// Replace expression and timezone; `None` if the task does not exist
    async fn update_schedule(
        &self,
        id: &str,
        expression: &str,
        timezone: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<Option<TaskDefinition>>;

    async fn set_next_run(&self, id: &str, next_run_at: Option<DateTime<Utc>>)
        -> SchedulerResult<bool>;

    /// Stamp a finished run: last_run_at, next_run_at, run_count + 1
    ///
    /// `next_run_at` is only kept while the task is active; a task paused
    /// during the run keeps a cleared next fire time.
    async fn record_run(
        &self,
        id: &str,
        ran_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool>;

    /// Delete a definition and all its executions in one transaction
    async fn delete_task(&self, id: &str) -> SchedulerResult<bool>;

    /// Open an execution record in the running state, returning its id
    async fn insert_execution(
        &self,
        task_id: &str,
        start_time: DateTime<Utc>,
        log_file: &str,
    ) -> SchedulerResult<i64>;

    /// Move a running execution to its terminal state
    ///
    /// Returns false if the record was not running, so a record is
    /// finished at most once.
    async fn finish_execution(
        &self,
        id: i64,
        outcome: &ExecutionOutcome,
        end_time: DateTime<Utc>,
    ) -> SchedulerResult<bool>;

    /// Fail every running execution not owned by one of `live_task_ids`
    ///
    /// Returns how many records were closed.
    async fn fail_interrupted_executions(
        &self,
        live_task_ids: &[String],
        failure: &TaskFailure,
        end_time: DateTime<Utc>,
    ) -> SchedulerResult<u64>;

    async fn get_execution(&self, id: i64) -> SchedulerResult<Option<ExecutionRecord>>;

    /// Executions for a task, newest first
    async fn list_executions(
        &self,
        task_id: &str,
        limit: i64,
        offset: i64,
    ) -> SchedulerResult<Vec<ExecutionRecord>>;

    async fn count_executions(&self, task_id: &str) -> SchedulerResult<i64>;
}
