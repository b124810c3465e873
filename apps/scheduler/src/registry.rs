//! In-memory registry of live scheduled triggers

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running trigger worker for one task
#[derive(Debug)]
pub struct LiveTrigger {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    expression: String,
    timezone: String,
}

impl LiveTrigger {
    pub fn new(
        cancel: CancellationToken,
        handle: JoinHandle<()>,
        expression: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            cancel,
            handle,
            expression: expression.into(),
            timezone: timezone.into(),
        }
    }

    /// Stop the worker; runs it already spawned keep going
    fn stop(self) {
        self.cancel.cancel();
        drop(self.handle);
    }
}

/// Live triggers keyed by task id
///
/// At most one trigger exists per id: inserting over an existing entry stops
/// the old worker first.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    triggers: Mutex<HashMap<String, LiveTrigger>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trigger, stopping any previous one for the same task
    pub fn insert(&self, task_id: impl Into<String>, trigger: LiveTrigger) -> bool {
        let previous = self.triggers.lock().insert(task_id.into(), trigger);
        let replaced = previous.is_some();
        if let Some(previous) = previous {
            previous.stop();
        }
        replaced
    }

    /// Stop and remove the trigger for a task
    pub fn remove(&self, task_id: &str) -> bool {
        let removed = self.triggers.lock().remove(task_id);
        match removed {
            Some(trigger) => {
                trigger.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every trigger; returns how many were live
    pub fn clear(&self) -> usize {
        let drained: Vec<LiveTrigger> = self.triggers.lock().drain().map(|(_, t)| t).collect();
        let count = drained.len();
        for trigger in drained {
            trigger.stop();
        }
        count
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.triggers.lock().contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.triggers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.lock().is_empty()
    }

    /// Ids with a live trigger, sorted
    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.triggers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// (expression, timezone) the live trigger was compiled from
    pub fn schedule_of(&self, task_id: &str) -> Option<(String, String)> {
        self.triggers
            .lock()
            .get(task_id)
            .map(|t| (t.expression.clone(), t.timezone.clone()))
    }
}
