//! Task bodies and the handler registry
//!
//! Every persisted task id must map to a registered [`TaskHandler`]; the
//! registry is built once at startup and checked before any trigger is
//! armed. Shipped handlers:
//! - `isrc-backfill`: resolve missing recording identifiers for songs
//! - `upc-backfill`: look up missing release identifiers for albums

pub mod isrc_backfill;
pub mod upc_backfill;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use encore_catalog_client::CatalogClient;

use crate::error::WorkerResult;
use crate::models::TaskOutput;
use crate::recordings::RecordingStore;
use crate::runner::TaskContext;

pub use isrc_backfill::IsrcBackfill;
pub use upc_backfill::UpcBackfill;

/// Task id of the song identifier backfill
pub const ISRC_BACKFILL: &str = "isrc-backfill";

/// Task id of the album identifier backfill
pub const UPC_BACKFILL: &str = "upc-backfill";

/// A task body invoked by the runner
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: &TaskContext) -> WorkerResult<TaskOutput>;
}

/// Handlers keyed by task id
#[derive(Clone, Default)]
pub struct TaskHandlers {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl std::fmt::Debug for TaskHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandlers")
            .field("ids", &self.ids())
            .finish()
    }
}

impl TaskHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shipped backfill handlers
    pub fn builtin(
        catalog: CatalogClient,
        recordings: Arc<dyn RecordingStore>,
        batch_size: i64,
    ) -> Self {
        let item_delay = catalog.request_delay();
        Self::new()
            .with(
                ISRC_BACKFILL,
                IsrcBackfill::new(catalog.clone(), recordings.clone(), batch_size)
                    .with_item_delay(item_delay),
            )
            .with(
                UPC_BACKFILL,
                UpcBackfill::new(catalog, recordings, batch_size).with_item_delay(item_delay),
            )
    }

    /// Register a handler, replacing any previous one for the id
    pub fn register(&mut self, id: impl Into<String>, handler: impl TaskHandler + 'static) {
        self.handlers.insert(id.into(), Arc::new(handler));
    }

    pub fn with(mut self, id: impl Into<String>, handler: impl TaskHandler + 'static) -> Self {
        self.register(id, handler);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Sleep between batch items; zero disables
pub(crate) async fn pause_between_items(delay: Duration, index: usize) {
    if index > 0 && !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
