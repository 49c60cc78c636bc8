//! Job entity model
//!
//! This module contains the SeaORM entity model for the jobs table, which
//! holds durable units of work with status, priority, and retry accounting,
//! plus the typed status and kind enums stored in its string columns.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::SyncError;

/// Job entity representing a durable unit of work
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    /// Unique identifier for the job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Dispatch key resolving to a registered handler
    pub job_type: String,

    /// Opaque structured payload, preserved verbatim across restarts
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Current status (pending, running, completed, failed, dead)
    pub status: String,

    /// Scheduling priority (higher values win)
    pub priority: i16,

    /// Number of start events recorded for this job
    pub attempts: i32,

    /// Ceiling on start events before dead-lettering
    pub max_attempts: i32,

    /// Human-readable message from the most recent failure
    pub last_error: Option<String>,

    /// Timestamp when the job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the job was last updated
    pub updated_at: DateTimeWithTimeZone,

    /// Earliest wall-clock time a pending job is eligible for dispatch
    pub scheduled_at: DateTimeWithTimeZone,

    /// Timestamp when the current attempt started
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job completed
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Job lifecycle states as stored in the status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting for dispatch
    Pending,
    /// Claimed by the runner, handler in flight
    Running,
    /// Handler finished successfully
    Completed,
    /// Handler failed with retry budget remaining
    Failed,
    /// Retry budget exhausted, escalated to the dead-letter queue
    Dead,
}

impl JobStatus {
    /// Database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            other => Err(SyncError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kinds of work the runner knows how to dispatch.
///
/// Stored as a string in the job_type column; handlers are registered per
/// kind, so an unknown stored string fails the job rather than the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Exhaustive listing of all current descriptors from the provider
    FullSync,
    /// Change-driven update starting from a stored cursor
    IncrementalSync,
}

impl JobKind {
    /// Database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullSync => "full_sync",
            Self::IncrementalSync => "incremental_sync",
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_sync" => Ok(Self::FullSync),
            "incremental_sync" => Ok(Self::IncrementalSync),
            other => Err(SyncError::InvalidJobType(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
