//! # File Store
//!
//! Repository operations for the files table. Writes are keyed upserts: the
//! same descriptor applied twice leaves the table observationally identical
//! (modulo `synced_at`), and the last write wins on every projected field.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use sea_orm::prelude::DateTimeWithTimeZone;

use crate::error::Result;
use crate::models::file_entry;
use crate::provider::types::FileDescriptor;

/// Repository for locally mirrored file descriptors
#[derive(Clone)]
pub struct FileStore {
    db: DatabaseConnection,
}

impl FileStore {
    /// Create a new FileStore over the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Upsert a batch of descriptors, one write per id.
    pub async fn upsert_batch(&self, descriptors: &[FileDescriptor]) -> Result<()> {
        if descriptors.is_empty() {
            return Ok(());
        }

        let now = Utc::now().fixed_offset();
        let models: Vec<file_entry::ActiveModel> = descriptors
            .iter()
            .map(|desc| self.to_active_model(desc, now))
            .collect::<Result<_>>()?;

        file_entry::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(file_entry::Column::Id)
                    .update_columns([
                        file_entry::Column::Name,
                        file_entry::Column::MimeType,
                        file_entry::Column::Size,
                        file_entry::Column::ParentId,
                        file_entry::Column::ModifiedTime,
                        file_entry::Column::CreatedTime,
                        file_entry::Column::Md5Checksum,
                        file_entry::Column::SyncedAt,
                        file_entry::Column::RawMetadata,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(())
    }

    /// Upsert a single descriptor.
    pub async fn upsert(&self, descriptor: &FileDescriptor) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(descriptor)).await
    }

    /// Look up a mirrored descriptor by provider file id.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<file_entry::Model>> {
        Ok(file_entry::Entity::find_by_id(id).one(&self.db).await?)
    }

    /// List children of a folder, name-ordered.
    pub async fn find_by_parent(&self, parent_id: &str) -> Result<Vec<file_entry::Model>> {
        Ok(file_entry::Entity::find()
            .filter(file_entry::Column::ParentId.eq(parent_id))
            .order_by_asc(file_entry::Column::Name)
            .all(&self.db)
            .await?)
    }

    /// Total number of mirrored descriptors.
    pub async fn count(&self) -> Result<u64> {
        Ok(file_entry::Entity::find().count(&self.db).await?)
    }

    /// Remove a mirrored descriptor. Used only when removal purging is
    /// enabled in configuration.
    pub async fn delete(&self, id: &str) -> Result<()> {
        file_entry::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    fn to_active_model(
        &self,
        desc: &FileDescriptor,
        synced_at: DateTimeWithTimeZone,
    ) -> Result<file_entry::ActiveModel> {
        Ok(file_entry::ActiveModel {
            id: Set(desc.id.clone()),
            name: Set(desc.name.clone()),
            mime_type: Set(desc.mime_type.clone()),
            size: Set(desc.size_bytes()),
            parent_id: Set(desc.parents.first().cloned()),
            modified_time: Set(parse_rfc3339(desc.modified_time.as_deref())),
            created_time: Set(parse_rfc3339(desc.created_time.as_deref())),
            md5_checksum: Set(desc.md5_checksum.clone()),
            synced_at: Set(synced_at),
            raw_metadata: Set(serde_json::to_value(desc)?),
        })
    }
}

fn parse_rfc3339(value: Option<&str>) -> Option<DateTimeWithTimeZone> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc).fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_parsing_tolerates_garbage() {
        assert!(parse_rfc3339(Some("2023-01-01T00:00:00.000Z")).is_some());
        assert!(parse_rfc3339(Some("not a time")).is_none());
        assert!(parse_rfc3339(None).is_none());
    }
}
