//! Error types shared across the sync core.
//!
//! Five kinds of failure cross component boundaries: rate limiting, transient
//! remote failures, terminal remote failures, policy refusals, and fatal
//! internal errors. Everything else (database, serialization) is plumbing that
//! the runner accounts for the same way as a handler failure.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Unified error type for the sync core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The provider rate limited us and the retry budget is exhausted.
    /// Carries the last server-signalled (or derived) retry hint.
    #[error("rate limited by provider, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// A 5xx-class provider failure that survived all retries.
    #[error("provider request failed with status {status}: {message}")]
    TransientRemote { status: u16, message: String },

    /// A non-retryable provider response (4xx other than rate limit).
    #[error("provider rejected request with status {status}: {message}")]
    TerminalRemote { status: u16, message: String },

    /// A transport-level failure (connection reset, timeout) with no status
    /// to classify.
    #[error("provider transport error: {0}")]
    Transport(String),

    /// An operation was refused without changing any state.
    #[error("{0}")]
    Policy(String),

    /// A job referenced a type no handler is registered for.
    #[error("no handler registered for job type '{job_type}'")]
    MissingHandler { job_type: String },

    /// A job id that does not exist in the store.
    #[error("job {job_id} not found")]
    JobNotFound { job_id: String },

    /// A sync id with no checkpoint behind it.
    #[error("no checkpoint found for sync {sync_id}")]
    CheckpointNotFound { sync_id: String },

    /// A stored status string that does not parse.
    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    /// A stored job type string that does not parse.
    #[error("invalid job type '{0}'")]
    InvalidJobType(String),

    /// A response body that could not be decoded.
    #[error("failed to parse provider response: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether a fresh attempt could plausibly succeed without operator
    /// intervention. Used for logging and metrics labels only; the runner
    /// retries every handler failure up to the job's attempt ceiling.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::RateLimited { .. }
                | SyncError::TransientRemote { .. }
                | SyncError::Transport(_)
        )
    }
}
