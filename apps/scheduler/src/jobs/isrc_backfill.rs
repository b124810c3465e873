//! ISRC backfill job
//!
//! Resolves songs that have no recording identifier against the external
//! catalog and writes the winning ISRC back. Catalog failures are counted
//! per song and never abort the batch; a failing store does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use encore_catalog_client::{CatalogClient, MatchDecision};

use super::{pause_between_items, TaskHandler};
use crate::error::WorkerResult;
use crate::models::{BackfillReport, BackfillTarget, TaskOutput};
use crate::recordings::{PendingSong, RecordingStore};
use crate::runner::TaskContext;

/// Backfills missing song ISRCs
pub struct IsrcBackfill {
    catalog: CatalogClient,
    recordings: Arc<dyn RecordingStore>,
    batch_size: i64,
    item_delay: Duration,
}

impl IsrcBackfill {
    pub fn new(catalog: CatalogClient, recordings: Arc<dyn RecordingStore>, batch_size: i64) -> Self {
        Self {
            catalog,
            recordings,
            batch_size,
            item_delay: Duration::ZERO,
        }
    }

    /// Delay between songs, on top of the client's own pacing
    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }
}

fn describe(song: &PendingSong) -> String {
    match song.query.primary_artist() {
        Some(artist) => format!("'{}' by {}", song.query.title, artist),
        None => format!("'{}'", song.query.title),
    }
}

#[async_trait]
impl TaskHandler for IsrcBackfill {
    async fn run(&self, ctx: &TaskContext) -> WorkerResult<TaskOutput> {
        let songs = self.recordings.songs_missing_isrc(self.batch_size).await?;
        if songs.is_empty() {
            ctx.write_log("No songs missing an ISRC").await;
            return Ok(TaskOutput::Skipped {
                reason: "no songs missing an ISRC".to_string(),
            });
        }

        ctx.write_log(format!("Resolving ISRCs for {} songs", songs.len()))
            .await;
        let mut report = BackfillReport::new(BackfillTarget::Isrc, songs.len());

        for (index, song) in songs.iter().enumerate() {
            pause_between_items(self.item_delay, index).await;
            self.recordings.mark_song_attempted(song.song_id).await?;
            let label = describe(song);

            let resolution = match self.catalog.resolve(&song.query).await {
                Ok(resolution) => resolution,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(song_id = %song.song_id, error = %e, "ISRC resolution failed");
                    ctx.write_log(format!("{}: lookup failed: {}", label, e)).await;
                    continue;
                }
            };

            let strategy = resolution
                .strategy
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string());

            match resolution.decision {
                MatchDecision::Matched { candidate, overlap } => {
                    if self
                        .recordings
                        .set_song_isrc(song.song_id, &candidate.isrc)
                        .await?
                    {
                        report.matched += 1;
                        let score = overlap
                            .map(|o| format!(", artist overlap {:.0}%", o * 100.0))
                            .unwrap_or_default();
                        ctx.write_log(format!(
                            "{}: matched {} via {}{}",
                            label, candidate.isrc, strategy, score
                        ))
                        .await;
                    } else {
                        report.skipped += 1;
                        ctx.write_log(format!("{}: ISRC already set, skipped", label))
                            .await;
                    }
                }
                MatchDecision::NoConfidentMatch {
                    candidates,
                    best_overlap,
                } => {
                    report.no_confident_match += 1;
                    ctx.write_log(format!(
                        "{}: no confident match among {} candidates via {} (best artist overlap {:.0}%)",
                        label,
                        candidates,
                        strategy,
                        best_overlap * 100.0
                    ))
                    .await;
                }
                MatchDecision::NotFound => {
                    report.not_found += 1;
                    ctx.write_log(format!("{}: not found", label)).await;
                }
            }
        }

        tracing::info!(
            task_id = %ctx.task_id(),
            total = report.total,
            matched = report.matched,
            failed = report.failed,
            "ISRC backfill finished"
        );
        ctx.write_log(report.summary()).await;
        Ok(TaskOutput::Backfill(report))
    }
}
