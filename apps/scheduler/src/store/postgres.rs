//! PostgreSQL task store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use super::TaskStore;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{
    ExecutionOutcome, ExecutionRecord, ExecutionStatus, NewTask, TaskDefinition, TaskFailure,
    TaskOutput, TaskStatus,
};

/// Columns for TaskDefinition queries
const TASK_COLUMNS: &str = r#"
    id, name, description, expression, timezone, status,
    last_run_at, next_run_at, run_count, log_directory,
    created_at, updated_at
"#;

/// Columns for execution queries
const EXECUTION_COLUMNS: &str = r#"
    id, task_id, start_time, end_time, status, result, error, log_file
"#;

/// Execution row as stored, with JSONB columns still wrapped
#[derive(Debug, FromRow)]
struct ExecutionRow {
    id: i64,
    task_id: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: ExecutionStatus,
    result: Option<Json<TaskOutput>>,
    error: Option<Json<TaskFailure>>,
    log_file: String,
}

impl From<ExecutionRow> for ExecutionRecord {
    fn from(row: ExecutionRow) -> Self {
        Self {
            id: row.id,
            task_id: row.task_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status,
            result: row.result.map(|Json(output)| output),
            error: row.error.map(|Json(failure)| failure),
            log_file: row.log_file,
        }
    }
}

/// Task store backed by the `scheduled_tasks` and `task_executions` tables
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn list_tasks(&self) -> SchedulerResult<Vec<TaskDefinition>> {
        let sql = format!("SELECT {} FROM scheduled_tasks ORDER BY id", TASK_COLUMNS);
        let tasks = sqlx::query_as::<_, TaskDefinition>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(tasks)
    }

    async fn get_task(&self, id: &str) -> SchedulerResult<Option<TaskDefinition>> {
        let sql = format!("SELECT {} FROM scheduled_tasks WHERE id = $1", TASK_COLUMNS);
        let task = sqlx::query_as::<_, TaskDefinition>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    async fn create_task(
        &self,
        task: &NewTask,
        log_directory: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<TaskDefinition> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM scheduled_tasks WHERE id = $1)")
                .bind(&task.id)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Err(SchedulerError::DuplicateTask(task.id.clone()));
        }

        let sql = format!(
            r#"
            INSERT INTO scheduled_tasks
                (id, name, description, expression, timezone, status, next_run_at, log_directory)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        let created = sqlx::query_as::<_, TaskDefinition>(&sql)
            .bind(&task.id)
            .bind(&task.name)
            .bind(&task.description)
            .bind(&task.expression)
            .bind(&task.timezone)
            .bind(task.status)
            .bind(next_run_at)
            .bind(log_directory)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    SchedulerError::DuplicateTask(task.id.clone())
                }
                other => SchedulerError::Database(other),
            })?;

        tx.commit().await?;
        Ok(created)
    }

    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<Option<TaskDefinition>> {
        let sql = format!(
            r#"
            UPDATE scheduled_tasks
            SET status = $2, next_run_at = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        let task = sqlx::query_as::<_, TaskDefinition>(&sql)
            .bind(id)
            .bind(status)
            .bind(next_run_at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    async fn update_schedule(
        &self,
        id: &str,
        expression: &str,
        timezone: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<Option<TaskDefinition>> {
        let sql = format!(
            r#"
            UPDATE scheduled_tasks
            SET expression = $2, timezone = $3, next_run_at = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        let task = sqlx::query_as::<_, TaskDefinition>(&sql)
            .bind(id)
            .bind(expression)
            .bind(timezone)
            .bind(next_run_at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    async fn set_next_run(
        &self,
        id: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET next_run_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_run(
        &self,
        id: &str,
        ran_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET last_run_at = $2,
                next_run_at = CASE WHEN status = 'active' THEN $3 ELSE NULL END,
                run_count = run_count + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ran_at)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_task(&self, id: &str) -> SchedulerResult<bool> {
        let mut tx = self.pool.begin().await?;

        let executions = sqlx::query("DELETE FROM task_executions WHERE task_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let task = sqlx::query("DELETE FROM scheduled_tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            task_id = %id,
            executions = executions.rows_affected(),
            "Deleted task history"
        );
        Ok(task.rows_affected() > 0)
    }

    async fn insert_execution(
        &self,
        task_id: &str,
        start_time: DateTime<Utc>,
        log_file: &str,
    ) -> SchedulerResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO task_executions (task_id, start_time, status, log_file)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(task_id)
        .bind(start_time)
        .bind(ExecutionStatus::Running)
        .bind(log_file)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn finish_execution(
        &self,
        id: i64,
        outcome: &ExecutionOutcome,
        end_time: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let (result, error) = match outcome {
            ExecutionOutcome::Completed(output) => (Some(Json(output)), None),
            ExecutionOutcome::Failed(failure) => (None, Some(Json(failure))),
        };

        let updated = sqlx::query(
            r#"
            UPDATE task_executions
            SET status = $2, end_time = $3, result = $4, error = $5
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(outcome.status())
        .bind(end_time)
        .bind(result)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn fail_interrupted_executions(
        &self,
        live_task_ids: &[String],
        failure: &TaskFailure,
        end_time: DateTime<Utc>,
    ) -> SchedulerResult<u64> {
        let updated = sqlx::query(
            r#"
            UPDATE task_executions
            SET status = 'failed', end_time = $2, error = $3
            WHERE status = 'running' AND NOT (task_id = ANY($1))
            "#,
        )
        .bind(live_task_ids)
        .bind(end_time)
        .bind(Json(failure))
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected())
    }

    async fn get_execution(&self, id: i64) -> SchedulerResult<Option<ExecutionRecord>> {
        let sql = format!("SELECT {} FROM task_executions WHERE id = $1", EXECUTION_COLUMNS);
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ExecutionRecord::from))
    }

    async fn list_executions(
        &self,
        task_id: &str,
        limit: i64,
        offset: i64,
    ) -> SchedulerResult<Vec<ExecutionRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM task_executions
            WHERE task_id = $1
            ORDER BY start_time DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            EXECUTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(task_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ExecutionRecord::from).collect())
    }

    async fn count_executions(&self, task_id: &str) -> SchedulerResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM task_executions WHERE task_id = $1")
                .bind(task_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
