//! # drivesync
//!
//! Resumable, rate-limited metadata synchronization for cloud file
//! providers. The crate ingests file descriptors from a remote provider into
//! a local durable store, tolerating process restarts, network failures, and
//! provider rate limits without duplicating work or losing progress.
//!
//! The moving parts:
//!
//! - [`provider::ProviderClient`] — the single point of contact with the
//!   remote provider: request spacing, retry classification, backoff.
//! - [`repositories::JobStore`] — the durable job queue with priorities,
//!   retry accounting, and a dead-letter log.
//! - [`runner::JobRunner`] — polls for runnable jobs and dispatches them to
//!   registered handlers under a concurrency bound.
//! - [`sync::SyncEngine`] — turns operator intents into checkpoints and job
//!   submissions; [`sync::handlers`] drive the paginated ingest loops.
//! - [`repositories::CheckpointStore`] — per-sync durable progress markers.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod provider;
pub mod repositories;
pub mod runner;
pub mod sync;
pub mod telemetry;

pub use error::{Result, SyncError};
pub use migration;
