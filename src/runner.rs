//! # Job Runner
//!
//! Polls the job store for runnable work and dispatches it to registered
//! handlers under a concurrency bound. The poll loop ticks once per second;
//! each tick claims up to `concurrency − active` eligible jobs, highest
//! priority first, and processes each in its own task.
//!
//! Failure accounting: a handler error consumes the attempt that was counted
//! at claim time. With budget remaining, the job is rescheduled with
//! exponential backoff (`retry_delay_ms × 2^attempts`, uncapped, no jitter —
//! jitter lives in the provider client). At the ceiling, the store escalates
//! to the dead-letter queue. Fatal conditions such as a missing handler fail
//! the job the same way; they never take the runner down.

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::events::{CoreEvent, EventBus, JobEvent};
use crate::models::job::{self, JobKind};
use crate::repositories::{JobStats, JobStore};

/// Fixed poll interval of the runner loop.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A unit of work executable by the runner.
///
/// Handlers receive the job's payload and row, and surface failures by
/// returning an error; the runner owns all retry accounting. Handlers may be
/// long-running and are never cancelled by the runner.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the work described by `payload`.
    async fn run(&self, payload: JsonValue, job: &job::Model) -> Result<()>;
}

/// Runner tuning knobs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of handlers in flight at once
    pub concurrency: usize,
    /// Base delay for the exponential retry backoff
    pub retry_delay_ms: u64,
    /// Re-queue `running` rows older than this at startup, when set
    pub stale_job_max_age: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            retry_delay_ms: 1_000,
            stale_job_max_age: None,
        }
    }
}

/// In-memory runner state merged with the store's per-status counts.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunnerStats {
    /// Whether the poll loop is live
    pub running: bool,
    /// Whether dispatch is paused
    pub paused: bool,
    /// Number of handlers currently in flight
    pub active: usize,
    /// Current concurrency bound
    pub concurrency: usize,
    /// Durable per-status counts
    pub jobs: JobStats,
}

/// The job runner. Cheap to clone; all clones share one runner.
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: JobStore,
    events: EventBus,
    handlers: RwLock<HashMap<JobKind, Arc<dyn JobHandler>>>,
    active: Mutex<HashSet<Uuid>>,
    paused: AtomicBool,
    running: AtomicBool,
    concurrency: AtomicUsize,
    retry_delay_ms: u64,
    stale_job_max_age: Option<Duration>,
    lifecycle: Mutex<Option<Lifecycle>>,
}

struct Lifecycle {
    shutdown: CancellationToken,
    poll_task: JoinHandle<()>,
}

impl JobRunner {
    /// Create a runner over a job store and event bus.
    pub fn new(db: DatabaseConnection, events: EventBus, config: RunnerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: JobStore::new(db),
                events,
                handlers: RwLock::new(HashMap::new()),
                active: Mutex::new(HashSet::new()),
                paused: AtomicBool::new(false),
                running: AtomicBool::new(false),
                concurrency: AtomicUsize::new(config.concurrency.max(1)),
                retry_delay_ms: config.retry_delay_ms,
                stale_job_max_age: config.stale_job_max_age,
                lifecycle: Mutex::new(None),
            }),
        }
    }

    /// Register the handler for a job kind. Replaces any previous handler.
    pub fn register_handler(&self, kind: JobKind, handler: Arc<dyn JobHandler>) {
        self.inner.handlers.write().unwrap().insert(kind, handler);
    }

    /// Start the poll loop. Idempotent: calling on a live runner is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(max_age) = self.inner.stale_job_max_age {
            let requeued = self.inner.jobs.requeue_stale_running(max_age).await?;
            if requeued > 0 {
                info!(requeued, "Recovered stale running jobs from a previous process");
            }
        }

        let shutdown = CancellationToken::new();
        let loop_token = shutdown.clone();
        let inner = Arc::clone(&self.inner);
        let poll_task = tokio::spawn(async move {
            info!("Job runner started");
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => {
                        info!("Job runner shutdown requested");
                        break;
                    }
                    _ = sleep(POLL_INTERVAL) => {
                        if let Err(err) = inner.tick().await {
                            error!(error = %err, "Runner tick failed");
                        }
                    }
                }
            }
        });

        *self.inner.lifecycle.lock().unwrap() = Some(Lifecycle {
            shutdown,
            poll_task,
        });
        Ok(())
    }

    /// Stop polling. In-flight handlers are not cancelled; they finish on
    /// their own or are abandoned at process exit.
    pub async fn stop(&self) {
        let lifecycle = self.inner.lifecycle.lock().unwrap().take();
        if let Some(lifecycle) = lifecycle {
            lifecycle.shutdown.cancel();
            let _ = lifecycle.poll_task.await;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        info!("Job runner stopped");
    }

    /// Suspend dispatch. In-flight handlers continue.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        info!("Job runner paused");
    }

    /// Resume dispatch.
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        info!("Job runner resumed");
    }

    /// Update the concurrency bound. Shrinking below the current active
    /// count cancels nothing; the excess drains naturally.
    pub fn set_concurrency(&self, concurrency: usize) {
        self.inner
            .concurrency
            .store(concurrency.max(1), Ordering::SeqCst);
        info!(concurrency, "Runner concurrency updated");
    }

    /// Ids of jobs whose handlers are currently in flight.
    pub fn get_active_jobs(&self) -> Vec<Uuid> {
        self.inner.active.lock().unwrap().iter().copied().collect()
    }

    /// Runner flags merged with the store's per-status counts.
    pub async fn get_stats(&self) -> Result<RunnerStats> {
        Ok(RunnerStats {
            running: self.inner.running.load(Ordering::SeqCst),
            paused: self.inner.paused.load(Ordering::SeqCst),
            active: self.inner.active.lock().unwrap().len(),
            concurrency: self.inner.concurrency.load(Ordering::SeqCst),
            jobs: self.inner.jobs.get_stats().await?,
        })
    }

    /// Access to the underlying job store (control surface passthrough).
    pub fn job_store(&self) -> &JobStore {
        &self.inner.jobs
    }

    /// Run a single poll tick immediately. Exposed for deterministic tests;
    /// the live loop calls the same path once per second.
    pub async fn tick_once(&self) -> Result<()> {
        self.inner.tick().await
    }

    /// Wait until no handlers are in flight. Test convenience.
    pub async fn drain(&self) {
        loop {
            if self.inner.active.lock().unwrap().is_empty() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Inner {
    async fn tick(self: &Arc<Self>) -> Result<()> {
        if self.paused.load(Ordering::SeqCst) {
            return Ok(());
        }

        let concurrency = self.concurrency.load(Ordering::SeqCst);
        let active = self.active.lock().unwrap().len();
        if active >= concurrency {
            return Ok(());
        }

        let slots = (concurrency - active) as u64;
        let pending = self.jobs.find_pending_jobs(slots).await?;
        if pending.is_empty() {
            return Ok(());
        }
        debug!(claimed = pending.len(), "Dispatching pending jobs");

        for job in pending {
            let claimed = match self.jobs.mark_running(job.id).await {
                Ok(job) => job,
                Err(err) => {
                    warn!(job_id = %job.id, error = %err, "Failed to claim job");
                    continue;
                }
            };

            self.active.lock().unwrap().insert(claimed.id);
            metrics::gauge!("runner_active_jobs").increment(1.0);
            self.events.emit(CoreEvent::Job(JobEvent::Started {
                job_id: claimed.id,
                job_type: claimed.job_type.clone(),
            }));

            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.process_job(&claimed).await;
            });
        }

        Ok(())
    }

    #[instrument(skip_all, fields(job_id = %job.id, job_type = %job.job_type))]
    async fn process_job(&self, job: &job::Model) {
        let outcome = self.execute_handler(job).await;
        if let Err(err) = self.settle(job, outcome).await {
            error!(error = %err, "Failed to record job outcome");
        }
        self.active.lock().unwrap().remove(&job.id);
        metrics::gauge!("runner_active_jobs").decrement(1.0);
    }

    async fn execute_handler(&self, job: &job::Model) -> Result<()> {
        let handler = JobKind::from_str(&job.job_type)
            .ok()
            .and_then(|kind| self.handlers.read().unwrap().get(&kind).cloned())
            .ok_or(SyncError::MissingHandler {
                job_type: job.job_type.clone(),
            })?;
        handler.run(job.payload.clone(), job).await
    }

    async fn settle(&self, job: &job::Model, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.jobs.mark_completed(job.id).await?;
                metrics::counter!("jobs_completed_total").increment(1);
                info!("Job completed");
                self.events.emit(CoreEvent::Job(JobEvent::Completed {
                    job_id: job.id,
                    job_type: job.job_type.clone(),
                }));
            }
            Err(err) => {
                // Re-read so the retry decision sees the latest attempt count.
                let latest = self.jobs.get(job.id).await?;
                let message = err.to_string();

                if latest.attempts < latest.max_attempts {
                    self.jobs.mark_failed(job.id, &message).await?;
                    let delay_ms = self
                        .retry_delay_ms
                        .saturating_mul(1u64 << (latest.attempts.clamp(0, 32) as u32));
                    self.jobs
                        .reschedule(job.id, Duration::from_millis(delay_ms))
                        .await?;
                    warn!(
                        attempts = latest.attempts,
                        max_attempts = latest.max_attempts,
                        delay_ms,
                        error = %message,
                        "Job failed, scheduled for retry"
                    );
                    self.events.emit(CoreEvent::Job(JobEvent::Retry {
                        job_id: job.id,
                        error: message,
                        delay_ms,
                    }));
                } else {
                    // The store resolves this to `dead` and writes the
                    // dead-letter row in the same transaction.
                    self.jobs.mark_failed(job.id, &message).await?;
                    metrics::counter!("jobs_failed_total").increment(1);
                    error!(
                        attempts = latest.attempts,
                        error = %message,
                        "Job failed permanently"
                    );
                    self.events.emit(CoreEvent::Job(JobEvent::Failed {
                        job_id: job.id,
                        error: message,
                    }));
                }
            }
        }
        Ok(())
    }
}
