//! UPC backfill job
//!
//! Looks up the parent release identifier of albums that have no UPC,
//! using the ISRC of one of their tracks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use encore_catalog_client::CatalogClient;

use super::{pause_between_items, TaskHandler};
use crate::error::WorkerResult;
use crate::models::{BackfillReport, BackfillTarget, TaskOutput};
use crate::recordings::RecordingStore;
use crate::runner::TaskContext;

/// Backfills missing album UPCs
pub struct UpcBackfill {
    catalog: CatalogClient,
    recordings: Arc<dyn RecordingStore>,
    batch_size: i64,
    item_delay: Duration,
}

impl UpcBackfill {
    pub fn new(catalog: CatalogClient, recordings: Arc<dyn RecordingStore>, batch_size: i64) -> Self {
        Self {
            catalog,
            recordings,
            batch_size,
            item_delay: Duration::ZERO,
        }
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }
}

#[async_trait]
impl TaskHandler for UpcBackfill {
    async fn run(&self, ctx: &TaskContext) -> WorkerResult<TaskOutput> {
        let albums = self.recordings.albums_missing_upc(self.batch_size).await?;
        if albums.is_empty() {
            ctx.write_log("No albums missing a UPC").await;
            return Ok(TaskOutput::Skipped {
                reason: "no albums missing a UPC".to_string(),
            });
        }

        ctx.write_log(format!("Looking up UPCs for {} albums", albums.len()))
            .await;
        let mut report = BackfillReport::new(BackfillTarget::Upc, albums.len());

        for (index, album) in albums.iter().enumerate() {
            pause_between_items(self.item_delay, index).await;
            self.recordings.mark_album_attempted(album.album_id).await?;

            match self.catalog.lookup_upc(&album.isrc).await {
                Ok(Some(upc)) => {
                    if self.recordings.set_album_upc(album.album_id, &upc).await? {
                        report.matched += 1;
                        ctx.write_log(format!(
                            "'{}': UPC {} (from {})",
                            album.title, upc, album.isrc
                        ))
                        .await;
                    } else {
                        report.skipped += 1;
                        ctx.write_log(format!("'{}': UPC already set, skipped", album.title))
                            .await;
                    }
                }
                Ok(None) => {
                    report.not_found += 1;
                    ctx.write_log(format!("'{}': no UPC for {}", album.title, album.isrc))
                        .await;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(album_id = %album.album_id, error = %e, "UPC lookup failed");
                    ctx.write_log(format!("'{}': lookup failed: {}", album.title, e))
                        .await;
                }
            }
        }

        ctx.write_log(report.summary()).await;
        Ok(TaskOutput::Backfill(report))
    }
}
