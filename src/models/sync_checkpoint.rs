//! SyncCheckpoint entity model
//!
//! SeaORM entity for the sync_checkpoints table: one row per sync holding the
//! page cursor, running descriptor count, and terminal status.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use crate::error::SyncError;

/// Checkpoint recording one sync's durable progress
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_checkpoints")]
pub struct Model {
    /// Surrogate identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Opaque sync identifier generated by the sync engine
    pub sync_id: String,

    /// Last cursor written after a fully-processed page, if any
    pub page_token: Option<String>,

    /// Monotonic count of descriptors processed so far
    pub files_processed: i64,

    /// Current status (in_progress, completed, failed, paused)
    pub status: String,

    /// Timestamp when the sync started
    pub started_at: DateTimeWithTimeZone,

    /// Timestamp of the most recent progress write
    pub updated_at: DateTimeWithTimeZone,

    /// Timestamp when the sync reached a terminal status
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Message from the failure that ended the sync, if any
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Checkpoint lifecycle states as stored in the status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    /// Sync is underway (or was underway when the process died)
    InProgress,
    /// All pages consumed
    Completed,
    /// The owning job exhausted its retries
    Failed,
    /// Paused by the operator; no new job will be enqueued until resumed
    Paused,
}

impl CheckpointStatus {
    /// Database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }
}

impl std::str::FromStr for CheckpointStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            other => Err(SyncError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
