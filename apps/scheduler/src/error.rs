//! Error handling for the Encore scheduler
//!
//! Two hierarchies live here: [`SchedulerError`] for admin operations on task
//! definitions (mapped to HTTP statuses at the router), and [`WorkerError`]
//! for faults raised by task bodies (recorded on the execution row).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use encore_catalog_client::CatalogError;
use thiserror::Error;

use crate::models::Envelope;

/// Errors raised by scheduler operations
#[derive(Error, Debug)]
pub enum SchedulerError {
    // ========== Configuration Errors ==========
    /// Cron expression could not be compiled
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// Timezone is not a known IANA zone
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// No handler is registered for this task id
    #[error("no handler registered for task: {0}")]
    UnknownTask(String),

    /// Malformed admin input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // ========== State Errors ==========
    /// A task with this id already exists
    #[error("task already exists: {0}")]
    DuplicateTask(String),

    /// No task with this id
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Operation refused because the task is paused
    #[error("task is paused: {0}")]
    TaskPaused(String),

    // ========== Infrastructure Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File system access error
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    /// Internal scheduler error
    #[error("internal scheduler error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// Create an invalid schedule error
    pub fn invalid_schedule(expression: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidSchedule {
            expression: expression.into(),
            reason: reason.to_string(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSchedule { .. }
            | Self::UnknownTimezone(_)
            | Self::UnknownTask(_)
            | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,

            Self::TaskNotFound(_) => StatusCode::NOT_FOUND,

            Self::DuplicateTask(_) | Self::TaskPaused(_) => StatusCode::CONFLICT,

            Self::Database(_) | Self::Filesystem(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidSchedule { .. } => "INVALID_SCHEDULE",
            Self::UnknownTimezone(_) => "UNKNOWN_TIMEZONE",
            Self::UnknownTask(_) => "UNKNOWN_TASK",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::DuplicateTask(_) => "DUPLICATE_TASK",
            Self::TaskNotFound(_) => "TASK_NOT_FOUND",
            Self::TaskPaused(_) => "TASK_PAUSED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Filesystem(_) => "FILESYSTEM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Log the error with appropriate severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Scheduler error"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Rejected scheduler operation"
            );
        }
    }
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        self.log();
        let body: Envelope<()> = Envelope::failure(self.to_string());
        (self.status_code(), Json(body)).into_response()
    }
}

/// Result type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors raised by task bodies
#[derive(Error, Debug)]
pub enum WorkerError {
    // ========== External Service Errors ==========
    /// Catalog request failed
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    // ========== Database Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    // ========== Job Processing Errors ==========
    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    // ========== Internal Errors ==========
    /// Internal worker error (catch-all for unexpected errors)
    #[error("internal worker error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Catalog(e) => e.is_retryable(),
            Self::Database(_) => true,
            _ => false,
        }
    }

    /// Get a severity level for logging
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Database(_) | Self::Internal(_) => ErrorSeverity::Error,
            Self::Catalog(CatalogError::Unauthorized | CatalogError::TokenUnavailable(_)) => {
                ErrorSeverity::Error
            }
            Self::Catalog(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Info,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self, task_id: &str) {
        match self.severity() {
            ErrorSeverity::Error => {
                tracing::error!(
                    error = %self,
                    task_id = task_id,
                    retryable = self.is_retryable(),
                    "Task error"
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error = %self,
                    task_id = task_id,
                    retryable = self.is_retryable(),
                    "Task warning"
                );
            }
            ErrorSeverity::Info => {
                tracing::info!(
                    error = %self,
                    task_id = task_id,
                    retryable = self.is_retryable(),
                    "Task info"
                );
            }
        }
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Standard errors
    Error,
    /// Warnings for expected failures
    Warning,
    /// Informational messages
    Info,
}

/// Result type alias for task bodies
pub type WorkerResult<T> = Result<T, WorkerError>;
