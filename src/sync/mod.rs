//! # Sync Orchestration
//!
//! The sync engine translates operator intents (full sync, incremental sync,
//! resume, pause, delete) into checkpoint rows and job submissions; the
//! handlers drive the paginated ingest loops the runner executes.

pub mod engine;
pub mod handlers;

pub use engine::{FullSyncPayload, IncrementalSyncPayload, SyncEngine};
pub use handlers::{FullSyncHandler, IncrementalSyncHandler};
