//! DeadLetter entity model
//!
//! SeaORM entity for the dead_letter_queue table: an append-only log of jobs
//! that exhausted their retry budget, with a payload snapshot for operator
//! inspection and re-enqueueing.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Dead-letter entry for a job whose retries are exhausted
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dead_letter_queue")]
pub struct Model {
    /// Surrogate identifier for the entry (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Identifier of the dead job this entry references
    pub job_id: Uuid,

    /// Dispatch key of the dead job
    pub job_type: String,

    /// Snapshot of the job payload at escalation time
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Message from the failure that exhausted the budget
    pub error_message: String,

    /// Timestamp when the job was dead-lettered
    pub failed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
