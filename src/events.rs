//! # Event Bus
//!
//! Typed notifications over `tokio::sync::broadcast`. Events are
//! observability signals only: nothing in the core consumes them to make a
//! control decision, and a bus with no subscribers drops events silently.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use tokio::sync::broadcast::Receiver;
pub use tokio::sync::broadcast::error::RecvError;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 128;

/// Top-level event type published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Job lifecycle notifications from the runner
    Job(JobEvent),
    /// Sync lifecycle notifications from the engine
    Sync(SyncEvent),
}

/// Notifications emitted by the job runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum JobEvent {
    /// A pending job was claimed and its handler started.
    Started {
        /// The claimed job.
        job_id: Uuid,
        /// Its dispatch key.
        job_type: String,
    },
    /// A handler returned successfully.
    Completed {
        /// The completed job.
        job_id: Uuid,
        /// Its dispatch key.
        job_type: String,
    },
    /// A handler failed with retry budget remaining; the job was rescheduled.
    Retry {
        /// The failed job.
        job_id: Uuid,
        /// The failure message.
        error: String,
        /// Backoff before the job becomes eligible again.
        delay_ms: u64,
    },
    /// A handler failed with no budget left; the job was dead-lettered.
    Failed {
        /// The dead job.
        job_id: Uuid,
        /// The failure message.
        error: String,
    },
}

/// Notifications emitted by the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A new sync was created and its job enqueued.
    Started {
        /// The new sync.
        sync_id: String,
        /// Whether the sync is full or incremental.
        job_type: String,
    },
    /// An interrupted or paused sync was resumed.
    Resumed {
        /// The resumed sync.
        sync_id: String,
    },
    /// A sync was paused; its running job, if any, is not interrupted.
    Paused {
        /// The paused sync.
        sync_id: String,
    },
    /// A sync's checkpoint was deleted.
    Deleted {
        /// The deleted sync.
        sync_id: String,
    },
}

/// Central bus for publishing and subscribing to [`CoreEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers it reached;
    /// zero subscribers is not an error.
    pub fn emit(&self, event: CoreEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Create an independent receiver for all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
