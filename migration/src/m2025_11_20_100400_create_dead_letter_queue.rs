//! Migration to create the dead_letter_queue table.
//!
//! Append-only log of jobs that exhausted their retry budget, kept with a
//! payload snapshot so an operator can inspect and re-enqueue them.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeadLetterQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeadLetterQueue::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeadLetterQueue::JobId).uuid().not_null())
                    .col(ColumnDef::new(DeadLetterQueue::JobType).text().not_null())
                    .col(
                        ColumnDef::new(DeadLetterQueue::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeadLetterQueue::ErrorMessage)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeadLetterQueue::FailedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_dead_letter_queue_job_id")
                    .table(DeadLetterQueue::Table)
                    .col(DeadLetterQueue::JobId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_dead_letter_queue_job_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(DeadLetterQueue::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeadLetterQueue {
    Table,
    Id,
    JobId,
    JobType,
    Payload,
    ErrorMessage,
    FailedAt,
}
