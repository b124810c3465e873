//! In-process task store

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::TaskStore;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{
    ExecutionOutcome, ExecutionRecord, ExecutionStatus, NewTask, TaskDefinition, TaskFailure,
    TaskStatus,
};

#[derive(Debug, Default)]
struct State {
    tasks: BTreeMap<String, TaskDefinition>,
    executions: BTreeMap<i64, ExecutionRecord>,
    log_files: HashSet<String>,
    last_execution_id: i64,
}

/// Task store held in memory, with the same constraints as the tables:
/// unique task ids, unique log paths, cascading deletes and
/// running-only terminal updates
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    state: Mutex<State>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every execution across all tasks, oldest first
    pub fn all_executions(&self) -> Vec<ExecutionRecord> {
        self.state.lock().executions.values().cloned().collect()
    }
}

fn update<F>(state: &mut State, id: &str, apply: F) -> Option<TaskDefinition>
where
    F: FnOnce(&mut TaskDefinition),
{
    let task = state.tasks.get_mut(id)?;
    apply(task);
    task.updated_at = Utc::now();
    Some(task.clone())
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list_tasks(&self) -> SchedulerResult<Vec<TaskDefinition>> {
        Ok(self.state.lock().tasks.values().cloned().collect())
    }

    async fn get_task(&self, id: &str) -> SchedulerResult<Option<TaskDefinition>> {
        Ok(self.state.lock().tasks.get(id).cloned())
    }

    async fn create_task(
        &self,
        task: &NewTask,
        log_directory: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<TaskDefinition> {
        let mut state = self.state.lock();
        if state.tasks.contains_key(&task.id) {
            return Err(SchedulerError::DuplicateTask(task.id.clone()));
        }

        let now = Utc::now();
        let created = TaskDefinition {
            id: task.id.clone(),
            name: task.name.clone(),
            description: task.description.clone(),
            expression: task.expression.clone(),
            timezone: task.timezone.clone(),
            status: task.status,
            last_run_at: None,
            next_run_at,
            run_count: 0,
            log_directory: log_directory.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.tasks.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<Option<TaskDefinition>> {
        Ok(update(&mut self.state.lock(), id, |task| {
            task.status = status;
            task.next_run_at = next_run_at;
        }))
    }

    async fn update_schedule(
        &self,
        id: &str,
        expression: &str,
        timezone: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<Option<TaskDefinition>> {
        Ok(update(&mut self.state.lock(), id, |task| {
            task.expression = expression.to_string();
            task.timezone = timezone.to_string();
            task.next_run_at = next_run_at;
        }))
    }

    async fn set_next_run(
        &self,
        id: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        let updated = update(&mut self.state.lock(), id, |task| {
            task.next_run_at = next_run_at;
        });
        Ok(updated.is_some())
    }

    async fn record_run(
        &self,
        id: &str,
        ran_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        let updated = update(&mut self.state.lock(), id, |task| {
            task.last_run_at = Some(ran_at);
            task.next_run_at = if task.is_active() { next_run_at } else { None };
            task.run_count += 1;
        });
        Ok(updated.is_some())
    }

    async fn delete_task(&self, id: &str) -> SchedulerResult<bool> {
        let mut state = self.state.lock();
        if state.tasks.remove(id).is_none() {
            return Ok(false);
        }

        let removed: Vec<ExecutionRecord> = state
            .executions
            .values()
            .filter(|e| e.task_id == id)
            .cloned()
            .collect();
        for execution in removed {
            state.executions.remove(&execution.id);
            state.log_files.remove(&execution.log_file);
        }
        Ok(true)
    }

    async fn insert_execution(
        &self,
        task_id: &str,
        start_time: DateTime<Utc>,
        log_file: &str,
    ) -> SchedulerResult<i64> {
        let mut state = self.state.lock();
        if !state.tasks.contains_key(task_id) {
            return Err(SchedulerError::TaskNotFound(task_id.to_string()));
        }
        if !state.log_files.insert(log_file.to_string()) {
            return Err(SchedulerError::Internal(format!(
                "log file already recorded: {}",
                log_file
            )));
        }

        state.last_execution_id += 1;
        let id = state.last_execution_id;
        state.executions.insert(
            id,
            ExecutionRecord {
                id,
                task_id: task_id.to_string(),
                start_time,
                end_time: None,
                status: ExecutionStatus::Running,
                result: None,
                error: None,
                log_file: log_file.to_string(),
            },
        );
        Ok(id)
    }

    async fn finish_execution(
        &self,
        id: i64,
        outcome: &ExecutionOutcome,
        end_time: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let mut state = self.state.lock();
        let Some(record) = state.executions.get_mut(&id) else {
            return Ok(false);
        };
        if record.status != ExecutionStatus::Running {
            return Ok(false);
        }

        record.status = outcome.status();
        record.end_time = Some(end_time);
        match outcome {
            ExecutionOutcome::Completed(output) => record.result = Some(output.clone()),
            ExecutionOutcome::Failed(failure) => record.error = Some(failure.clone()),
        }
        Ok(true)
    }

    async fn fail_interrupted_executions(
        &self,
        live_task_ids: &[String],
        failure: &TaskFailure,
        end_time: DateTime<Utc>,
    ) -> SchedulerResult<u64> {
        let mut state = self.state.lock();
        let mut closed = 0;
        for record in state.executions.values_mut() {
            if record.status != ExecutionStatus::Running
                || live_task_ids.contains(&record.task_id)
            {
                continue;
            }
            record.status = ExecutionStatus::Failed;
            record.end_time = Some(end_time);
            record.error = Some(failure.clone());
            closed += 1;
        }
        Ok(closed)
    }

    async fn get_execution(&self, id: i64) -> SchedulerResult<Option<ExecutionRecord>> {
        Ok(self.state.lock().executions.get(&id).cloned())
    }

    async fn list_executions(
        &self,
        task_id: &str,
        limit: i64,
        offset: i64,
    ) -> SchedulerResult<Vec<ExecutionRecord>> {
        let state = self.state.lock();
        let mut records: Vec<ExecutionRecord> = state
            .executions
            .values()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));

        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_executions(&self, task_id: &str) -> SchedulerResult<i64> {
        let state = self.state.lock();
        Ok(state.executions.values().filter(|e| e.task_id == task_id).count() as i64)
    }
}
