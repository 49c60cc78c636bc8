//! Migration to create the files table.
//!
//! The files table is the local mirror of remote file descriptors, keyed by
//! the provider's file id. Rows are upserted by the sync handlers; the raw
//! provider record is retained alongside the projected columns.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Files::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Files::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(Files::Name).text().not_null())
                    .col(ColumnDef::new(Files::MimeType).text().not_null())
                    .col(ColumnDef::new(Files::Size).big_integer().null())
                    .col(ColumnDef::new(Files::ParentId).text().null())
                    .col(
                        ColumnDef::new(Files::ModifiedTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Files::CreatedTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Files::Md5Checksum).text().null())
                    .col(
                        ColumnDef::new(Files::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Files::RawMetadata).json_binary().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_files_parent_id")
                    .table(Files::Table)
                    .col(Files::ParentId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_files_parent_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Files::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Files {
    Table,
    Id,
    Name,
    MimeType,
    Size,
    ParentId,
    ModifiedTime,
    CreatedTime,
    Md5Checksum,
    SyncedAt,
    RawMetadata,
}
