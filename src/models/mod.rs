//! SeaORM entity models for the durable tables owned by the sync core.

pub mod dead_letter;
pub mod file_entry;
pub mod job;
pub mod sync_checkpoint;
