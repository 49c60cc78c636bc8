//! Repository layer over the durable tables.
//!
//! Each store encapsulates the SeaORM access patterns for one table (or a
//! tightly coupled pair, as with jobs and the dead-letter queue). All state
//! transitions happen here; callers never mutate entities directly.

pub mod checkpoint;
pub mod file;
pub mod job;

pub use checkpoint::CheckpointStore;
pub use file::FileStore;
pub use job::{CreateJobOptions, JobStats, JobStore};
