//! FileEntry entity model
//!
//! SeaORM entity for the files table: the local mirror of remote file
//! descriptors, keyed by the provider's file id. The raw provider record is
//! retained alongside the projected columns.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// Locally mirrored file descriptor
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "files")]
pub struct Model {
    /// Provider-assigned file identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// File name
    pub name: String,

    /// MIME type as reported by the provider
    pub mime_type: String,

    /// Size in bytes (absent for folders)
    pub size: Option<i64>,

    /// First parent folder id, if any
    pub parent_id: Option<String>,

    /// Remote modification time
    pub modified_time: Option<DateTimeWithTimeZone>,

    /// Remote creation time
    pub created_time: Option<DateTimeWithTimeZone>,

    /// Content hash as reported by the provider
    pub md5_checksum: Option<String>,

    /// Timestamp of the most recent successful write of this row
    pub synced_at: DateTimeWithTimeZone,

    /// Raw provider record, preserved verbatim
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_metadata: JsonValue,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
