//! # Sync Engine
//!
//! Orchestrates sync lifecycles over the job and checkpoint stores. The
//! engine never talks to the provider inside a sync; it only fetches the
//! initial change cursor when starting incremental syncs, and caches it in
//! memory for subsequent starts.
//!
//! Pause is a status, not a signal: pausing flips the checkpoint and is
//! consulted the next time a sync would start. A running handler is never
//! preempted.

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::events::{CoreEvent, EventBus, SyncEvent};
use crate::models::job::JobKind;
use crate::models::sync_checkpoint::{self, CheckpointStatus};
use crate::provider::ProviderClient;
use crate::repositories::{CheckpointStore, CreateJobOptions, JobStore};

/// Full syncs outrank incremental syncs in the queue.
const FULL_SYNC_PRIORITY: i16 = 10;
const INCREMENTAL_SYNC_PRIORITY: i16 = 5;

/// Retry budget for sync jobs.
const SYNC_MAX_ATTEMPTS: i32 = 3;

/// Payload of a full-sync job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullSyncPayload {
    /// The sync this job drives
    pub sync_id: String,
    /// Advisory resume cursor; the checkpoint's stored cursor wins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<String>,
}

/// Payload of an incremental-sync job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalSyncPayload {
    /// The sync this job drives
    pub sync_id: String,
    /// Change cursor to start from when the checkpoint has none
    pub start_page_token: String,
}

/// The sync engine: lifecycle orchestration over runner, stores, and client.
pub struct SyncEngine {
    jobs: JobStore,
    checkpoints: CheckpointStore,
    provider: Arc<ProviderClient>,
    events: EventBus,
    start_token_cache: Mutex<Option<String>>,
}

impl SyncEngine {
    /// Create an engine over the shared database connection and provider.
    pub fn new(db: DatabaseConnection, provider: Arc<ProviderClient>, events: EventBus) -> Self {
        Self {
            jobs: JobStore::new(db.clone()),
            checkpoints: CheckpointStore::new(db),
            provider,
            events,
            start_token_cache: Mutex::new(None),
        }
    }

    /// Start a full sync. If a sync is already in progress, attach to it by
    /// resuming it instead of starting a second one; this is what makes a
    /// restart after a crash pick up where the dead process left off.
    #[instrument(skip(self))]
    pub async fn start_full_sync(&self) -> Result<String> {
        if let Some(active) = self.checkpoints.find_latest_in_progress().await? {
            info!(sync_id = %active.sync_id, "Attaching to sync already in progress");
            return self.resume_sync(&active.sync_id).await;
        }

        let sync_id = Uuid::new_v4().to_string();
        self.checkpoints.create(&sync_id).await?;

        let payload = serde_json::to_value(FullSyncPayload {
            sync_id: sync_id.clone(),
            resume_from: None,
        })?;
        self.jobs
            .create(
                JobKind::FullSync,
                payload,
                CreateJobOptions {
                    priority: FULL_SYNC_PRIORITY,
                    max_attempts: SYNC_MAX_ATTEMPTS,
                    scheduled_at: None,
                },
            )
            .await?;

        info!(sync_id = %sync_id, "Full sync started");
        self.events.emit(CoreEvent::Sync(SyncEvent::Started {
            sync_id: sync_id.clone(),
            job_type: JobKind::FullSync.as_str().to_string(),
        }));
        Ok(sync_id)
    }

    /// Start an incremental sync from the cached change cursor, fetching one
    /// from the provider on first use.
    #[instrument(skip(self))]
    pub async fn start_incremental_sync(&self) -> Result<String> {
        let start_page_token = {
            let mut cache = self.start_token_cache.lock().await;
            if let Some(token) = cache.clone() {
                token
            } else {
                let token = self.provider.start_page_token().await?;
                *cache = Some(token.clone());
                token
            }
        };

        let sync_id = Uuid::new_v4().to_string();
        self.checkpoints.create(&sync_id).await?;

        let payload = serde_json::to_value(IncrementalSyncPayload {
            sync_id: sync_id.clone(),
            start_page_token,
        })?;
        self.jobs
            .create(
                JobKind::IncrementalSync,
                payload,
                CreateJobOptions {
                    priority: INCREMENTAL_SYNC_PRIORITY,
                    max_attempts: SYNC_MAX_ATTEMPTS,
                    scheduled_at: None,
                },
            )
            .await?;

        info!(sync_id = %sync_id, "Incremental sync started");
        self.events.emit(CoreEvent::Sync(SyncEvent::Started {
            sync_id: sync_id.clone(),
            job_type: JobKind::IncrementalSync.as_str().to_string(),
        }));
        Ok(sync_id)
    }

    /// Resume an interrupted or paused sync by flipping its checkpoint back
    /// to in-progress and enqueueing a fresh full-sync job. The handler reads
    /// the stored cursor, so `resume_from` in the payload is advisory.
    #[instrument(skip(self))]
    pub async fn resume_sync(&self, sync_id: &str) -> Result<String> {
        let checkpoint = self.checkpoints.get_by_sync_id(sync_id).await?;
        let status = CheckpointStatus::from_str(&checkpoint.status)?;
        if status == CheckpointStatus::Completed {
            return Err(SyncError::Policy(format!(
                "sync {} already completed and cannot be resumed",
                sync_id
            )));
        }

        self.checkpoints.resume(checkpoint.id).await?;

        let payload = serde_json::to_value(FullSyncPayload {
            sync_id: sync_id.to_string(),
            resume_from: checkpoint.page_token.clone(),
        })?;
        self.jobs
            .create(
                JobKind::FullSync,
                payload,
                CreateJobOptions {
                    priority: FULL_SYNC_PRIORITY,
                    max_attempts: SYNC_MAX_ATTEMPTS,
                    scheduled_at: None,
                },
            )
            .await?;

        info!(
            sync_id = %sync_id,
            resume_from = ?checkpoint.page_token,
            "Sync resumed"
        );
        self.events.emit(CoreEvent::Sync(SyncEvent::Resumed {
            sync_id: sync_id.to_string(),
        }));
        Ok(sync_id.to_string())
    }

    /// Pause a sync. The currently running job is not interrupted; pausing
    /// only prevents the next start from enqueueing new work until resumed.
    #[instrument(skip(self))]
    pub async fn pause_sync(&self, sync_id: &str) -> Result<()> {
        let checkpoint = self.checkpoints.get_by_sync_id(sync_id).await?;
        self.checkpoints.pause(checkpoint.id).await?;

        info!(sync_id = %sync_id, "Sync paused");
        self.events.emit(CoreEvent::Sync(SyncEvent::Paused {
            sync_id: sync_id.to_string(),
        }));
        Ok(())
    }

    /// Delete a sync's checkpoint. Refused while the sync is in progress.
    #[instrument(skip(self))]
    pub async fn delete_sync(&self, sync_id: &str) -> Result<()> {
        let checkpoint = self.checkpoints.get_by_sync_id(sync_id).await?;
        let status = CheckpointStatus::from_str(&checkpoint.status)?;
        if status == CheckpointStatus::InProgress {
            return Err(SyncError::Policy(format!(
                "sync {} is in progress and cannot be deleted",
                sync_id
            )));
        }

        self.checkpoints.delete(sync_id).await?;

        info!(sync_id = %sync_id, "Sync deleted");
        self.events.emit(CoreEvent::Sync(SyncEvent::Deleted {
            sync_id: sync_id.to_string(),
        }));
        Ok(())
    }

    /// The checkpoint behind a sync id.
    pub async fn get_status(&self, sync_id: &str) -> Result<sync_checkpoint::Model> {
        self.checkpoints.get_by_sync_id(sync_id).await
    }

    /// The most recently started sync still in progress, if any.
    pub async fn get_current_sync(&self) -> Result<Option<sync_checkpoint::Model>> {
        self.checkpoints.find_latest_in_progress().await
    }

    /// Recent syncs, most recently started first.
    pub async fn get_sync_history(&self, limit: u64) -> Result<Vec<sync_checkpoint::Model>> {
        self.checkpoints.get_history(limit).await
    }
}
