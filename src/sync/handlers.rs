//! # Sync Handlers
//!
//! The page loops executed by the runner. Both handlers share the same
//! durability discipline: the checkpoint write for page N commits before the
//! request for page N+1 is issued, so a crash between pages leaves the
//! stored cursor pointing at a page that has not been consumed yet.
//!
//! Handlers do not catch their own failures; errors bubble out so the runner
//! can count the attempt and reschedule or dead-letter the job. On the final
//! attempt the handler flips the checkpoint to failed before bubbling, so a
//! dead-lettered sync is visible as a failed checkpoint rather than one
//! stuck in progress.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::models::job;
use crate::models::sync_checkpoint;
use crate::provider::ProviderClient;
use crate::repositories::{CheckpointStore, FileStore};
use crate::runner::JobHandler;
use crate::sync::engine::{FullSyncPayload, IncrementalSyncPayload};

/// Handler for `full_sync` jobs: exhaustively walks the descriptor listing.
pub struct FullSyncHandler {
    provider: Arc<ProviderClient>,
    checkpoints: CheckpointStore,
    files: FileStore,
    page_size: u32,
}

impl FullSyncHandler {
    /// Create a handler over the shared stores and client.
    pub fn new(
        provider: Arc<ProviderClient>,
        checkpoints: CheckpointStore,
        files: FileStore,
        page_size: u32,
    ) -> Self {
        Self {
            provider,
            checkpoints,
            files,
            page_size,
        }
    }

    async fn walk_pages(
        &self,
        sync_id: &str,
        checkpoint: &sync_checkpoint::Model,
    ) -> Result<()> {
        // The stored cursor wins over the advisory resume_from in the payload.
        let mut page_token = checkpoint.page_token.clone();
        let mut total = if page_token.is_some() {
            info!(
                sync_id,
                files_processed = checkpoint.files_processed,
                "Resuming full sync from stored cursor"
            );
            checkpoint.files_processed
        } else {
            0
        };

        loop {
            let page = self
                .provider
                .list_descriptors(page_token.as_deref(), self.page_size)
                .await?;

            self.files.upsert_batch(&page.files).await?;
            total += page.files.len() as i64;
            metrics::counter!("sync_pages_total").increment(1);
            metrics::counter!("sync_files_processed_total").increment(page.files.len() as u64);

            self.checkpoints
                .update_progress(checkpoint.id, page.next_page_token.clone(), total)
                .await?;

            debug!(
                sync_id,
                page_files = page.files.len(),
                total,
                "Full sync page committed"
            );

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        self.checkpoints.mark_completed(checkpoint.id, total).await?;
        info!(sync_id, files_processed = total, "Full sync completed");
        Ok(())
    }
}

#[async_trait]
impl JobHandler for FullSyncHandler {
    #[instrument(skip_all, fields(job_id = %job.id))]
    async fn run(&self, payload: JsonValue, job: &job::Model) -> Result<()> {
        let payload: FullSyncPayload = serde_json::from_value(payload)?;
        let checkpoint = self.checkpoints.get_by_sync_id(&payload.sync_id).await?;

        let result = self.walk_pages(&payload.sync_id, &checkpoint).await;
        if let Err(err) = &result {
            if job.attempts >= job.max_attempts {
                self.checkpoints
                    .mark_failed(checkpoint.id, &err.to_string())
                    .await?;
            }
        }
        result
    }
}

/// Handler for `incremental_sync` jobs: walks the change log from a cursor.
pub struct IncrementalSyncHandler {
    provider: Arc<ProviderClient>,
    checkpoints: CheckpointStore,
    files: FileStore,
    purge_removed: bool,
}

impl IncrementalSyncHandler {
    /// Create a handler over the shared stores and client. With
    /// `purge_removed` unset, removed changes are recorded but the mirrored
    /// descriptor is left in place.
    pub fn new(
        provider: Arc<ProviderClient>,
        checkpoints: CheckpointStore,
        files: FileStore,
        purge_removed: bool,
    ) -> Self {
        Self {
            provider,
            checkpoints,
            files,
            purge_removed,
        }
    }

    async fn walk_changes(
        &self,
        sync_id: &str,
        start_page_token: &str,
        checkpoint: &sync_checkpoint::Model,
    ) -> Result<()> {
        let resuming = checkpoint.page_token.is_some();
        let mut page_token = checkpoint
            .page_token
            .clone()
            .unwrap_or_else(|| start_page_token.to_string());
        let mut total = if resuming { checkpoint.files_processed } else { 0 };

        loop {
            let page = self.provider.list_changes(&page_token).await?;

            let mut upserts = Vec::new();
            let mut removed = 0u64;
            for change in &page.changes {
                if change.removed {
                    removed += 1;
                    if self.purge_removed {
                        if let Some(file_id) = &change.file_id {
                            self.files.delete(file_id).await?;
                        }
                    } else if let Some(file_id) = &change.file_id {
                        debug!(file_id = %file_id, "File removed remotely; descriptor retained");
                    }
                } else if let Some(file) = &change.file {
                    if !file.trashed {
                        upserts.push(file.clone());
                    }
                }
            }

            self.files.upsert_batch(&upserts).await?;
            total += page.changes.len() as i64;
            metrics::counter!("sync_pages_total").increment(1);
            metrics::counter!("sync_files_processed_total").increment(upserts.len() as u64);

            // Mid-walk the cursor is the next page; on the final page it is
            // the head token the next incremental sync starts from.
            let next_cursor = page
                .next_page_token
                .clone()
                .or(page.new_start_page_token.clone());
            self.checkpoints
                .update_progress(checkpoint.id, next_cursor, total)
                .await?;

            debug!(
                sync_id,
                changes = page.changes.len(),
                upserted = upserts.len(),
                removed,
                total,
                "Incremental sync page committed"
            );

            match page.next_page_token {
                Some(next) => page_token = next,
                None => break,
            }
        }

        self.checkpoints.mark_completed(checkpoint.id, total).await?;
        info!(sync_id, changes_processed = total, "Incremental sync completed");
        Ok(())
    }
}

#[async_trait]
impl JobHandler for IncrementalSyncHandler {
    #[instrument(skip_all, fields(job_id = %job.id))]
    async fn run(&self, payload: JsonValue, job: &job::Model) -> Result<()> {
        let payload: IncrementalSyncPayload = serde_json::from_value(payload)?;
        let checkpoint = self.checkpoints.get_by_sync_id(&payload.sync_id).await?;

        let result = self
            .walk_changes(&payload.sync_id, &payload.start_page_token, &checkpoint)
            .await;
        if let Err(err) = &result {
            if job.attempts >= job.max_attempts {
                self.checkpoints
                    .mark_failed(checkpoint.id, &err.to_string())
                    .await?;
            }
        }
        result
    }
}
