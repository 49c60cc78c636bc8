//! # drivesync Main Entry Point
//!
//! Binary bootstrap: configuration, telemetry, database pool, and wiring of
//! the provider client, runner, and sync engine.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;
use tracing::info;

use drivesync::config::{AppConfig, ConfigLoader};
use drivesync::db;
use drivesync::events::EventBus;
use drivesync::migration::{Migrator, MigratorTrait};
use drivesync::models::job::JobKind;
use drivesync::models::sync_checkpoint::CheckpointStatus;
use drivesync::provider::{BearerCaller, ProviderClient};
use drivesync::repositories::{CheckpointStore, FileStore};
use drivesync::runner::{JobRunner, RunnerConfig};
use drivesync::sync::{FullSyncHandler, IncrementalSyncHandler, SyncEngine};
use drivesync::telemetry;

#[derive(Parser)]
#[command(name = "drivesync")]
#[command(about = "Resumable metadata synchronization service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Run one sync to completion and exit
    Sync {
        #[command(subcommand)]
        mode: SyncMode,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
}

#[derive(Subcommand)]
enum SyncMode {
    /// Exhaustive listing of all current descriptors
    Full,
    /// Change-driven update from the current change cursor
    Incremental,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    let db = db::init_pool(&config).await?;

    match cli.command {
        Some(Commands::Migrate { action }) => handle_migrate_command(&db, action).await,
        command => run_service(&config, db, command).await,
    }
}

async fn run_service(
    config: &AppConfig,
    db: DatabaseConnection,
    command: Option<Commands>,
) -> anyhow::Result<()> {
    // Run migrations automatically for local and test profiles.
    if config.profile == "local" || config.profile == "test" {
        info!(profile = %config.profile, "Applying migrations automatically");
        Migrator::up(&db, None).await?;
    }

    if let Ok(redacted) = config.redacted_json() {
        info!(profile = %config.profile, configuration = %redacted, "Configuration loaded");
    }

    let (runner, engine) = build_service(config, db);
    runner.start().await?;

    match command {
        Some(Commands::Sync { mode }) => {
            let sync_id = match mode {
                SyncMode::Full => engine.start_full_sync().await?,
                SyncMode::Incremental => engine.start_incremental_sync().await?,
            };
            wait_for_sync(&engine, &sync_id).await?;
            runner.stop().await;
        }
        Some(Commands::Migrate { .. }) => unreachable!("handled by the caller"),
        None => {
            info!("drivesync running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            runner.stop().await;
        }
    }

    Ok(())
}

fn build_service(config: &AppConfig, db: DatabaseConnection) -> (JobRunner, SyncEngine) {
    let caller = Arc::new(BearerCaller::new(
        reqwest::Client::new(),
        config.provider_access_token.clone(),
    ));
    let provider = Arc::new(ProviderClient::new(
        caller,
        config.provider_base_url.clone(),
        config.max_retries,
        config.retry_delay_ms,
    ));
    let events = EventBus::default();

    let stale_job_max_age = (config.stale_job_recovery_minutes > 0)
        .then(|| Duration::from_secs(config.stale_job_recovery_minutes * 60));
    let runner = JobRunner::new(
        db.clone(),
        events.clone(),
        RunnerConfig {
            concurrency: config.concurrency,
            retry_delay_ms: config.retry_delay_ms,
            stale_job_max_age,
        },
    );

    let checkpoints = CheckpointStore::new(db.clone());
    let files = FileStore::new(db.clone());
    runner.register_handler(
        JobKind::FullSync,
        Arc::new(FullSyncHandler::new(
            Arc::clone(&provider),
            checkpoints.clone(),
            files.clone(),
            config.page_size,
        )),
    );
    runner.register_handler(
        JobKind::IncrementalSync,
        Arc::new(IncrementalSyncHandler::new(
            Arc::clone(&provider),
            checkpoints,
            files,
            config.purge_removed,
        )),
    );

    let engine = SyncEngine::new(db, provider, events);
    (runner, engine)
}

async fn wait_for_sync(engine: &SyncEngine, sync_id: &str) -> anyhow::Result<()> {
    loop {
        let checkpoint = engine.get_status(sync_id).await?;
        match CheckpointStatus::from_str(&checkpoint.status)? {
            CheckpointStatus::Completed => {
                info!(
                    sync_id,
                    files_processed = checkpoint.files_processed,
                    "Sync finished"
                );
                return Ok(());
            }
            CheckpointStatus::Failed => {
                anyhow::bail!(
                    "sync {} failed: {}",
                    sync_id,
                    checkpoint.error_message.unwrap_or_default()
                );
            }
            CheckpointStatus::InProgress | CheckpointStatus::Paused => {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn handle_migrate_command(
    db: &DatabaseConnection,
    action: MigrateAction,
) -> anyhow::Result<()> {
    match action {
        MigrateAction::Up => {
            info!("Applying migrations");
            Migrator::up(db, None).await?;
        }
        MigrateAction::Down => {
            info!("Rolling back last migration");
            Migrator::down(db, Some(1)).await?;
        }
        MigrateAction::Status => {
            let applied = Migrator::get_applied_migrations(db).await?;
            let pending = Migrator::get_pending_migrations(db).await?;
            info!(
                applied = applied.len(),
                pending = pending.len(),
                "Migration status"
            );
        }
    }
    Ok(())
}
