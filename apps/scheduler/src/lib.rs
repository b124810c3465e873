//! Encore task scheduler
//!
//! Keeps a registry of live cron triggers consistent with the persisted task
//! definitions, runs task bodies with per-execution log files and history
//! records, and ships the catalog identifier backfill jobs.
//!
//! The pieces, leaves first:
//! - [`log_sink`]: append-only log file per execution
//! - [`store`]: task definitions and execution history
//! - [`registry`]: live triggers keyed by task id
//! - [`runner`]: execution lifecycle around a task body
//! - [`scheduler`]: admin operations and boot-time reconciliation
//! - [`jobs`]: task handlers (`isrc-backfill`, `upc-backfill`)
//! - [`routes`]: admin HTTP surface

pub mod config;
pub mod error;
pub mod jobs;
pub mod log_sink;
pub mod models;
pub mod recordings;
pub mod registry;
pub mod routes;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod store;

pub use error::{SchedulerError, SchedulerResult, WorkerError, WorkerResult};
pub use jobs::{TaskHandler, TaskHandlers};
pub use runner::{RunTrigger, TaskContext, TaskRunner};
pub use scheduler::Scheduler;
