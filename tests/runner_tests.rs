//! Integration tests for the job runner: dispatch ordering, concurrency
//! bounds, retry accounting, dead-letter escalation, and lifecycle events.

mod test_utils;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use drivesync::SyncError;
use drivesync::events::{CoreEvent, EventBus, JobEvent};
use drivesync::models::job::{self, JobKind, JobStatus};
use drivesync::repositories::CreateJobOptions;
use drivesync::runner::{JobHandler, JobRunner, RunnerConfig};
use test_utils::{run_until_settled, setup_test_db};

fn opts(priority: i16, max_attempts: i32) -> CreateJobOptions {
    CreateJobOptions {
        priority,
        max_attempts,
        scheduled_at: None,
    }
}

fn runner_config(concurrency: usize) -> RunnerConfig {
    RunnerConfig {
        concurrency,
        // Keep retry backoff tiny so rescheduled jobs become eligible fast.
        retry_delay_ms: 1,
        stale_job_max_age: None,
    }
}

/// Records payloads in completion order.
struct RecordingHandler {
    seen: Arc<StdMutex<Vec<JsonValue>>>,
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn run(&self, payload: JsonValue, _job: &job::Model) -> drivesync::Result<()> {
        self.seen.lock().unwrap().push(payload);
        Ok(())
    }
}

/// Fails a fixed number of times, then succeeds.
struct FlakyHandler {
    failures_remaining: AtomicI32,
}

#[async_trait]
impl JobHandler for FlakyHandler {
    async fn run(&self, _payload: JsonValue, _job: &job::Model) -> drivesync::Result<()> {
        if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Err(SyncError::TransientRemote {
                status: 500,
                message: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Always fails.
struct FailingHandler;

#[async_trait]
impl JobHandler for FailingHandler {
    async fn run(&self, _payload: JsonValue, _job: &job::Model) -> drivesync::Result<()> {
        Err(SyncError::TransientRemote {
            status: 503,
            message: "always down".to_string(),
        })
    }
}

/// Tracks how many handlers overlap in time.
struct ConcurrencyProbe {
    current: AtomicUsize,
    max_seen: AtomicUsize,
}

#[async_trait]
impl JobHandler for ConcurrencyProbe {
    async fn run(&self, _payload: JsonValue, _job: &job::Model) -> drivesync::Result<()> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn priority_order_is_respected_under_serial_dispatch() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(db, EventBus::default(), runner_config(1));
    let seen = Arc::new(StdMutex::new(Vec::new()));
    runner.register_handler(
        JobKind::FullSync,
        Arc::new(RecordingHandler { seen: seen.clone() }),
    );

    let store = runner.job_store();
    store.create(JobKind::FullSync, json!({"p": 1}), opts(1, 3)).await?;
    store.create(JobKind::FullSync, json!({"p": 5}), opts(5, 3)).await?;
    store.create(JobKind::FullSync, json!({"p": 10}), opts(10, 3)).await?;

    run_until_settled(&runner).await;

    let order: Vec<i64> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|v| v["p"].as_i64().unwrap())
        .collect();
    assert_eq!(order, vec![10, 5, 1]);
    Ok(())
}

#[tokio::test]
async fn concurrency_of_one_serializes_all_work() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(db, EventBus::default(), runner_config(1));
    let probe = Arc::new(ConcurrencyProbe {
        current: AtomicUsize::new(0),
        max_seen: AtomicUsize::new(0),
    });
    runner.register_handler(JobKind::FullSync, probe.clone());

    let store = runner.job_store();
    for i in 0..4 {
        store
            .create(JobKind::FullSync, json!({"n": i}), opts(0, 3))
            .await?;
    }

    run_until_settled(&runner).await;

    assert_eq!(probe.max_seen.load(Ordering::SeqCst), 1);
    let stats = runner.get_stats().await?;
    assert_eq!(stats.jobs.completed, 4);
    Ok(())
}

#[tokio::test]
async fn concurrency_bound_caps_parallel_handlers() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(db, EventBus::default(), runner_config(2));
    let probe = Arc::new(ConcurrencyProbe {
        current: AtomicUsize::new(0),
        max_seen: AtomicUsize::new(0),
    });
    runner.register_handler(JobKind::FullSync, probe.clone());

    let store = runner.job_store();
    for i in 0..6 {
        store
            .create(JobKind::FullSync, json!({"n": i}), opts(0, 3))
            .await?;
    }

    run_until_settled(&runner).await;

    assert!(probe.max_seen.load(Ordering::SeqCst) <= 2);
    Ok(())
}

#[tokio::test]
async fn failing_handler_retries_then_completes() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(db, EventBus::default(), runner_config(1));
    runner.register_handler(
        JobKind::FullSync,
        Arc::new(FlakyHandler {
            failures_remaining: AtomicI32::new(2),
        }),
    );

    let store = runner.job_store();
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 5)).await?;

    run_until_settled(&runner).await;

    let job = store.get(id).await?;
    assert_eq!(job.status, JobStatus::Completed.as_str());
    // Two failures plus the successful attempt.
    assert_eq!(job.attempts, 3);
    assert!(job.attempts <= job.max_attempts);
    Ok(())
}

#[tokio::test]
async fn job_with_single_attempt_dead_letters_on_first_failure() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(db, EventBus::default(), runner_config(1));
    runner.register_handler(JobKind::FullSync, Arc::new(FailingHandler));

    let store = runner.job_store();
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 1)).await?;

    run_until_settled(&runner).await;

    let job = store.get(id).await?;
    assert_eq!(job.status, JobStatus::Dead.as_str());
    assert_eq!(job.attempts, 1);

    let entries = store.get_dead_letter_jobs(10).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].job_id, id);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_end_in_dead_letter() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(db, EventBus::default(), runner_config(1));
    runner.register_handler(JobKind::FullSync, Arc::new(FailingHandler));

    let store = runner.job_store();
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 2)).await?;

    run_until_settled(&runner).await;

    let job = store.get(id).await?;
    assert_eq!(job.status, JobStatus::Dead.as_str());
    assert_eq!(job.attempts, 2);
    assert_eq!(store.get_dead_letter_jobs(10).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn missing_handler_fails_the_job_not_the_runner() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(db, EventBus::default(), runner_config(1));
    // Only full_sync is registered; the incremental job has no handler.
    runner.register_handler(
        JobKind::FullSync,
        Arc::new(RecordingHandler {
            seen: Arc::new(StdMutex::new(Vec::new())),
        }),
    );

    let store = runner.job_store();
    let orphan = store
        .create(JobKind::IncrementalSync, json!({}), opts(0, 1))
        .await?;
    let healthy = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;

    run_until_settled(&runner).await;

    let orphan = store.get(orphan).await?;
    assert_eq!(orphan.status, JobStatus::Dead.as_str());
    assert!(orphan.last_error.unwrap().contains("no handler registered"));

    let healthy = store.get(healthy).await?;
    assert_eq!(healthy.status, JobStatus::Completed.as_str());
    Ok(())
}

#[tokio::test]
async fn paused_runner_dispatches_nothing() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(db, EventBus::default(), runner_config(1));
    runner.register_handler(
        JobKind::FullSync,
        Arc::new(RecordingHandler {
            seen: Arc::new(StdMutex::new(Vec::new())),
        }),
    );

    let store = runner.job_store();
    store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;

    runner.pause();
    runner.tick_once().await?;
    runner.drain().await;
    let stats = runner.get_stats().await?;
    assert!(stats.paused);
    assert_eq!(stats.jobs.pending, 1);

    runner.resume();
    run_until_settled(&runner).await;
    let stats = runner.get_stats().await?;
    assert_eq!(stats.jobs.completed, 1);
    Ok(())
}

#[tokio::test]
async fn stats_merge_runner_flags_with_store_counts() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(db, EventBus::default(), runner_config(3));

    let stats = runner.get_stats().await?;
    assert!(!stats.running);
    assert!(!stats.paused);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.concurrency, 3);

    runner.set_concurrency(7);
    let stats = runner.get_stats().await?;
    assert_eq!(stats.concurrency, 7);
    Ok(())
}

#[tokio::test]
async fn lifecycle_events_are_emitted_in_order() -> Result<()> {
    let db = setup_test_db().await?;
    let events = EventBus::new(64);
    let mut subscriber = events.subscribe();
    let runner = JobRunner::new(db, events, runner_config(1));
    runner.register_handler(
        JobKind::FullSync,
        Arc::new(FlakyHandler {
            failures_remaining: AtomicI32::new(1),
        }),
    );

    let store = runner.job_store();
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;

    run_until_settled(&runner).await;

    let mut kinds = Vec::new();
    while let Ok(event) = subscriber.try_recv() {
        if let CoreEvent::Job(job_event) = event {
            kinds.push(match job_event {
                JobEvent::Started { job_id, .. } => {
                    assert_eq!(job_id, id);
                    "started"
                }
                JobEvent::Retry { delay_ms, .. } => {
                    assert!(delay_ms >= 1);
                    "retry"
                }
                JobEvent::Completed { .. } => "completed",
                JobEvent::Failed { .. } => "failed",
            });
        }
    }
    assert_eq!(kinds, vec!["started", "retry", "started", "completed"]);
    Ok(())
}

#[tokio::test]
async fn start_and_stop_control_the_poll_loop() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(db, EventBus::default(), runner_config(1));
    runner.register_handler(
        JobKind::FullSync,
        Arc::new(RecordingHandler {
            seen: Arc::new(StdMutex::new(Vec::new())),
        }),
    );

    runner.start().await?;
    assert!(runner.get_stats().await?.running);

    let store = runner.job_store();
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;

    // The live loop polls once per second.
    for _ in 0..60 {
        let job = store.get(id).await?;
        if job.status == JobStatus::Completed.as_str() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(store.get(id).await?.status, JobStatus::Completed.as_str());

    runner.stop().await;
    assert!(!runner.get_stats().await?.running);
    Ok(())
}

#[tokio::test]
async fn stale_running_jobs_are_recovered_on_start() -> Result<()> {
    let db = setup_test_db().await?;
    let runner = JobRunner::new(
        db.clone(),
        EventBus::default(),
        RunnerConfig {
            concurrency: 1,
            retry_delay_ms: 1,
            stale_job_max_age: Some(Duration::ZERO),
        },
    );
    runner.register_handler(
        JobKind::FullSync,
        Arc::new(RecordingHandler {
            seen: Arc::new(StdMutex::new(Vec::new())),
        }),
    );

    // Simulate a row abandoned by a crashed process.
    let store = runner.job_store();
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;
    store.mark_running(id).await?;

    runner.start().await?;
    for _ in 0..60 {
        let job = store.get(id).await?;
        if job.status == JobStatus::Completed.as_str() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    runner.stop().await;

    assert_eq!(store.get(id).await?.status, JobStatus::Completed.as_str());
    Ok(())
}
