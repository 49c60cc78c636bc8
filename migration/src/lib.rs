//! Database migrations for the drivesync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_11_20_100100_create_files;
mod m2025_11_20_100200_create_sync_checkpoints;
mod m2025_11_20_100300_create_jobs;
mod m2025_11_20_100400_create_dead_letter_queue;
mod m2025_11_20_100500_create_tokens;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_11_20_100100_create_files::Migration),
            Box::new(m2025_11_20_100200_create_sync_checkpoints::Migration),
            Box::new(m2025_11_20_100300_create_jobs::Migration),
            Box::new(m2025_11_20_100400_create_dead_letter_queue::Migration),
            Box::new(m2025_11_20_100500_create_tokens::Migration),
        ]
    }
}
