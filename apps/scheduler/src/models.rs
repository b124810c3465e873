//! Task definitions, execution records and admin payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted task status, matching PostgreSQL task_status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Active,
    Paused,
}

/// Execution status, matching PostgreSQL execution_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "execution_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Whether the execution has finished
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// A persisted scheduled task
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Stable key, also the handler id
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Five-field cron expression
    pub expression: String,
    /// IANA timezone the expression is evaluated in
    pub timezone: String,
    pub status: TaskStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Next fire time; `None` while paused
    pub next_run_at: Option<DateTime<Utc>>,
    pub run_count: i64,
    /// Directory holding this task's dated log folders
    pub log_directory: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskDefinition {
    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }
}

/// Admin input for creating a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub expression: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Defaults to `<TASK_LOG_DIR>/<id>`
    #[serde(default)]
    pub log_directory: Option<String>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl NewTask {
    /// Active task in UTC with the default log directory
    pub fn new(id: impl Into<String>, name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            expression: expression.into(),
            timezone: default_timezone(),
            status: TaskStatus::Active,
            log_directory: None,
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Admin input for rescheduling a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub expression: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

/// Which item type a backfill run targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackfillTarget {
    /// Songs missing a recording identifier
    Isrc,
    /// Albums missing a release identifier
    Upc,
}

/// Counters for one backfill run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillReport {
    pub target: BackfillTarget,
    pub total: usize,
    pub matched: usize,
    pub no_confident_match: usize,
    pub not_found: usize,
    /// Items that gained an identifier from elsewhere mid-run
    pub skipped: usize,
    pub failed: usize,
}

impl BackfillReport {
    pub fn new(target: BackfillTarget, total: usize) -> Self {
        Self {
            target,
            total,
            matched: 0,
            no_confident_match: 0,
            not_found: 0,
            skipped: 0,
            failed: 0,
        }
    }

    /// Percentage of items that were matched
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.matched as f64 * 100.0 / self.total as f64
    }

    pub fn summary(&self) -> String {
        let label = match self.target {
            BackfillTarget::Isrc => "ISRC",
            BackfillTarget::Upc => "UPC",
        };
        format!(
            "{} backfill: {}/{} matched ({:.1}%), {} no confident match, {} not found, {} skipped, {} failed",
            label,
            self.matched,
            self.total,
            self.success_rate(),
            self.no_confident_match,
            self.not_found,
            self.skipped,
            self.failed
        )
    }
}

/// Outcome of a successful task body, stored in the `result` column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutput {
    Backfill(BackfillReport),
    /// The body found nothing to do
    Skipped { reason: String },
    Message { message: String },
}

impl TaskOutput {
    pub fn summary(&self) -> String {
        match self {
            Self::Backfill(report) => report.summary(),
            Self::Skipped { reason } => format!("skipped: {}", reason),
            Self::Message { message } => message.clone(),
        }
    }
}

/// How a task body failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Error,
    Panic,
}

/// Fault raised by a task body, stored in the `error` column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Error source chain, outermost first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl TaskFailure {
    /// Build a failure from an error and its source chain
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        Self {
            kind: FailureKind::Error,
            message: err.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Panic,
            message: message.into(),
            stack: None,
        }
    }

    /// A run the process stopped tracking before it finished
    pub fn interrupted() -> Self {
        Self {
            kind: FailureKind::Error,
            message: "interrupted: the scheduler stopped before the run finished".to_string(),
            stack: None,
        }
    }
}

/// One run of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub task_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub result: Option<TaskOutput>,
    pub error: Option<TaskFailure>,
    pub log_file: String,
}

/// Terminal state written to an execution record
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed(TaskOutput),
    Failed(TaskFailure),
}

impl ExecutionOutcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Completed(_) => ExecutionStatus::Completed,
            Self::Failed(_) => ExecutionStatus::Failed,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Completed(output) => output.summary(),
            Self::Failed(failure) => failure.message.clone(),
        }
    }
}

/// Structured result of a runner invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    pub message: String,
    /// Set when an execution record was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<i64>,
}

impl RunReport {
    /// Invocation that did not run the body
    pub fn noop(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            execution_id: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            execution_id: None,
        }
    }

    pub fn from_outcome(execution_id: i64, outcome: &ExecutionOutcome) -> Self {
        Self {
            success: matches!(outcome, ExecutionOutcome::Completed(_)),
            message: outcome.message(),
            execution_id: Some(execution_id),
        }
    }
}

/// Task definition plus whether a live trigger is registered for it
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusView {
    #[serde(flatten)]
    pub task: TaskDefinition,
    pub scheduled: bool,
}

/// One page of execution history, newest first
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPage {
    pub items: Vec<ExecutionRecord>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

/// Log content for one execution
#[derive(Debug, Clone, Serialize)]
pub struct LogContent {
    pub execution_id: i64,
    pub log_file: Option<String>,
    pub content: String,
    /// True when the file was unavailable and the content was built from
    /// the stored record instead
    pub synthesized: bool,
}

/// Response envelope for every admin operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}
