//! # Checkpoint Store
//!
//! Repository operations for the sync_checkpoints table. A checkpoint is the
//! durability anchor of a sync: the page-N progress write must be visible
//! before the page-(N+1) provider request, so a crash between pages leaves
//! the cursor pointing at a page that has not yet been consumed.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::sync_checkpoint::{self, CheckpointStatus};

/// Repository for sync checkpoint database operations
#[derive(Clone)]
pub struct CheckpointStore {
    db: DatabaseConnection,
}

impl CheckpointStore {
    /// Create a new CheckpointStore over the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a fresh `in_progress` checkpoint for a sync id.
    pub async fn create(&self, sync_id: &str) -> Result<Uuid> {
        let now = Utc::now().fixed_offset();
        let id = Uuid::new_v4();

        let model = sync_checkpoint::ActiveModel {
            id: Set(id),
            sync_id: Set(sync_id.to_string()),
            page_token: Set(None),
            files_processed: Set(0),
            status: Set(CheckpointStatus::InProgress.as_str().to_string()),
            started_at: Set(now),
            updated_at: Set(now),
            completed_at: Set(None),
            error_message: Set(None),
        };
        model.insert(&self.db).await?;

        Ok(id)
    }

    /// Look up the checkpoint for a sync id.
    pub async fn find_by_sync_id(&self, sync_id: &str) -> Result<Option<sync_checkpoint::Model>> {
        Ok(sync_checkpoint::Entity::find()
            .filter(sync_checkpoint::Column::SyncId.eq(sync_id))
            .one(&self.db)
            .await?)
    }

    /// Look up the checkpoint for a sync id, failing if absent.
    pub async fn get_by_sync_id(&self, sync_id: &str) -> Result<sync_checkpoint::Model> {
        self.find_by_sync_id(sync_id)
            .await?
            .ok_or(SyncError::CheckpointNotFound {
                sync_id: sync_id.to_string(),
            })
    }

    /// The most recently started checkpoint still in `in_progress`, if any.
    pub async fn find_latest_in_progress(&self) -> Result<Option<sync_checkpoint::Model>> {
        Ok(sync_checkpoint::Entity::find()
            .filter(sync_checkpoint::Column::Status.eq(CheckpointStatus::InProgress.as_str()))
            .order_by_desc(sync_checkpoint::Column::StartedAt)
            .one(&self.db)
            .await?)
    }

    /// Record page progress: the cursor for the next page and the running
    /// descriptor count. The count never decreases across updates.
    pub async fn update_progress(
        &self,
        id: Uuid,
        page_token: Option<String>,
        files_processed: i64,
    ) -> Result<sync_checkpoint::Model> {
        let checkpoint = self.get(id).await?;
        let floor = checkpoint.files_processed;

        let mut active: sync_checkpoint::ActiveModel = checkpoint.into();
        active.page_token = Set(page_token);
        active.files_processed = Set(files_processed.max(floor));
        active.updated_at = Set(Utc::now().fixed_offset());
        Ok(active.update(&self.db).await?)
    }

    /// Terminal success: record the final count and stamp completion.
    pub async fn mark_completed(
        &self,
        id: Uuid,
        files_processed: i64,
    ) -> Result<sync_checkpoint::Model> {
        let checkpoint = self.get(id).await?;
        let floor = checkpoint.files_processed;
        let now = Utc::now().fixed_offset();

        let mut active: sync_checkpoint::ActiveModel = checkpoint.into();
        active.status = Set(CheckpointStatus::Completed.as_str().to_string());
        active.files_processed = Set(files_processed.max(floor));
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(active.update(&self.db).await?)
    }

    /// Terminal failure: keep the cursor for resumption, record the error.
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<sync_checkpoint::Model> {
        let checkpoint = self.get(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: sync_checkpoint::ActiveModel = checkpoint.into();
        active.status = Set(CheckpointStatus::Failed.as_str().to_string());
        active.error_message = Set(Some(error.to_string()));
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(active.update(&self.db).await?)
    }

    /// Flip to `paused`. A running job is not interrupted; the status is
    /// consulted at the next sync start.
    pub async fn pause(&self, id: Uuid) -> Result<sync_checkpoint::Model> {
        self.set_status(id, CheckpointStatus::Paused).await
    }

    /// Flip back to `in_progress` so a fresh job can be enqueued.
    pub async fn resume(&self, id: Uuid) -> Result<sync_checkpoint::Model> {
        self.set_status(id, CheckpointStatus::InProgress).await
    }

    /// Remove the checkpoint row for a sync id.
    pub async fn delete(&self, sync_id: &str) -> Result<()> {
        sync_checkpoint::Entity::delete_many()
            .filter(sync_checkpoint::Column::SyncId.eq(sync_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Recent checkpoints, most recently started first.
    pub async fn get_history(&self, limit: u64) -> Result<Vec<sync_checkpoint::Model>> {
        Ok(sync_checkpoint::Entity::find()
            .order_by_desc(sync_checkpoint::Column::StartedAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    async fn get(&self, id: Uuid) -> Result<sync_checkpoint::Model> {
        sync_checkpoint::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(SyncError::CheckpointNotFound {
                sync_id: id.to_string(),
            })
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: CheckpointStatus,
    ) -> Result<sync_checkpoint::Model> {
        let checkpoint = self.get(id).await?;
        let mut active: sync_checkpoint::ActiveModel = checkpoint.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now().fixed_offset());
        Ok(active.update(&self.db).await?)
    }
}
