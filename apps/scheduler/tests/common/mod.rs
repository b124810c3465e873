//! Common test utilities for scheduler integration tests
//!
//! Builds a scheduler over the in-memory task store with a temporary log
//! directory and a set of scripted handlers.

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod handlers;

pub use handlers::*;

use std::sync::Arc;
use std::time::Duration;

use encore_scheduler::models::{NewTask, TaskDefinition};
use encore_scheduler::store::{MemoryTaskStore, TaskStore};
use encore_scheduler::{Scheduler, TaskHandlers};
use tempfile::TempDir;

pub const COUNTING: &str = "counting";
pub const FAILING: &str = "failing";
pub const PANICKING: &str = "panicking";
pub const SLOW: &str = "slow";

/// Every minute; never fires during a test
pub const EVERY_MINUTE: &str = "* * * * *";

/// Scheduler wired to an in-memory store
pub struct Harness {
    pub store: Arc<MemoryTaskStore>,
    pub scheduler: Arc<Scheduler>,
    pub counting: CountingHandler,
    pub log_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let counting = CountingHandler::default();
        let handlers = TaskHandlers::new()
            .with(COUNTING, counting.clone())
            .with(FAILING, FailingHandler)
            .with(PANICKING, PanickingHandler)
            .with(
                SLOW,
                SlowHandler {
                    delay: Duration::from_millis(300),
                },
            );
        Self::with_handlers(handlers, counting)
    }

    pub fn with_handlers(handlers: TaskHandlers, counting: CountingHandler) -> Self {
        let log_dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(MemoryTaskStore::new());
        let dyn_store: Arc<dyn TaskStore> = store.clone();
        let scheduler = Arc::new(Scheduler::new(dyn_store, handlers, log_dir.path()));
        Self {
            store,
            scheduler,
            counting,
            log_dir,
        }
    }

    /// Create an active task through the scheduler
    pub async fn create(&self, id: &str) -> TaskDefinition {
        self.scheduler
            .create(NewTask::new(id, format!("{} task", id), EVERY_MINUTE))
            .await
            .expect("create task")
    }

    /// Insert a definition straight into the store, bypassing validation
    pub async fn seed(&self, task: NewTask) -> TaskDefinition {
        let dir = self.log_dir.path().join(&task.id);
        self.store
            .create_task(&task, &dir.to_string_lossy(), None)
            .await
            .expect("seed task")
    }
}
