//! Integration tests for the job store: dispatch selection, the legal state
//! transitions, dead-letter escalation, and operator retry.

mod test_utils;

use anyhow::Result;
use serde_json::json;
use std::time::Duration;

use drivesync::SyncError;
use drivesync::models::job::{JobKind, JobStatus};
use drivesync::repositories::{CreateJobOptions, JobStore};
use test_utils::setup_test_db;

fn opts(priority: i16, max_attempts: i32) -> CreateJobOptions {
    CreateJobOptions {
        priority,
        max_attempts,
        scheduled_at: None,
    }
}

#[tokio::test]
async fn created_job_starts_pending_with_payload_preserved() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);

    let payload = json!({"sync_id": "s1", "nested": {"key": [1, 2, 3]}});
    let id = store
        .create(JobKind::FullSync, payload.clone(), opts(10, 3))
        .await?;

    let job = store.get(id).await?;
    assert_eq!(job.status, JobStatus::Pending.as_str());
    assert_eq!(job.job_type, "full_sync");
    assert_eq!(job.payload, payload);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_attempts, 3);
    assert!(job.started_at.is_none());
    Ok(())
}

#[tokio::test]
async fn dispatch_orders_by_priority_then_creation() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);

    let low = store
        .create(JobKind::FullSync, json!({"p": 1}), opts(1, 3))
        .await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let mid_first = store
        .create(JobKind::FullSync, json!({"p": 5}), opts(5, 3))
        .await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let mid_second = store
        .create(JobKind::FullSync, json!({"p": 5}), opts(5, 3))
        .await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let high = store
        .create(JobKind::FullSync, json!({"p": 10}), opts(10, 3))
        .await?;

    let pending = store.find_pending_jobs(10).await?;
    let ids: Vec<_> = pending.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![high, mid_first, mid_second, low]);
    Ok(())
}

#[tokio::test]
async fn future_scheduled_jobs_are_not_dispatched() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);

    store
        .create(
            JobKind::FullSync,
            json!({}),
            CreateJobOptions {
                priority: 0,
                max_attempts: 3,
                scheduled_at: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
            },
        )
        .await?;

    assert!(store.find_pending_jobs(10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn mark_running_counts_an_attempt_and_stamps_start() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;

    let job = store.mark_running(id).await?;
    assert_eq!(job.status, JobStatus::Running.as_str());
    assert_eq!(job.attempts, 1);
    assert!(job.started_at.is_some());
    Ok(())
}

#[tokio::test]
async fn completed_job_records_completion_time() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;

    store.mark_running(id).await?;
    let job = store.mark_completed(id).await?;
    assert_eq!(job.status, JobStatus::Completed.as_str());
    assert!(job.completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn failure_with_budget_left_lands_in_failed() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;

    store.mark_running(id).await?;
    let job = store.mark_failed(id, "page fetch exploded").await?;
    assert_eq!(job.status, JobStatus::Failed.as_str());
    assert_eq!(job.last_error.as_deref(), Some("page fetch exploded"));

    let stats = store.get_stats().await?;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.dead_letter, 0);
    Ok(())
}

#[tokio::test]
async fn failure_at_the_ceiling_dead_letters_atomically() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);
    let id = store
        .create(JobKind::FullSync, json!({"sync_id": "s1"}), opts(0, 1))
        .await?;

    store.mark_running(id).await?;
    let job = store.mark_failed(id, "fatal").await?;
    assert_eq!(job.status, JobStatus::Dead.as_str());
    assert_eq!(job.attempts, 1);

    let entries = store.get_dead_letter_jobs(10).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].job_id, id);
    assert_eq!(entries[0].job_type, "full_sync");
    assert_eq!(entries[0].payload, json!({"sync_id": "s1"}));
    assert_eq!(entries[0].error_message, "fatal");
    Ok(())
}

#[tokio::test]
async fn reschedule_returns_failed_job_to_pending_later() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;

    store.mark_running(id).await?;
    store.mark_failed(id, "transient").await?;
    let job = store.reschedule(id, Duration::from_secs(3600)).await?;

    assert_eq!(job.status, JobStatus::Pending.as_str());
    // Delayed past the horizon, so not yet eligible.
    assert!(store.find_pending_jobs(10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn retry_dead_job_resets_budget_and_removes_entry() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 1)).await?;

    store.mark_running(id).await?;
    store.mark_failed(id, "fatal").await?;
    let entry = store.get_dead_letter_jobs(1).await?.remove(0);

    let job = store.retry_dead_job(entry.id).await?;
    assert_eq!(job.status, JobStatus::Pending.as_str());
    assert_eq!(job.attempts, 0);
    assert!(job.last_error.is_none());

    assert!(store.get_dead_letter_jobs(10).await?.is_empty());
    // Eligible again immediately.
    assert_eq!(store.find_pending_jobs(10).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn illegal_transitions_are_refused_without_state_change() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;

    // pending → completed is not legal
    let err = store.mark_completed(id).await.unwrap_err();
    assert!(matches!(err, SyncError::Policy(_)));

    // pending → failed is not legal either
    assert!(store.mark_failed(id, "nope").await.is_err());

    let job = store.get(id).await?;
    assert_eq!(job.status, JobStatus::Pending.as_str());
    assert_eq!(job.attempts, 0);
    Ok(())
}

#[tokio::test]
async fn stats_count_each_status_and_the_dead_letter_backlog() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);

    store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;
    let running = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;
    store.mark_running(running).await?;
    let dead = store.create(JobKind::FullSync, json!({}), opts(0, 1)).await?;
    store.mark_running(dead).await?;
    store.mark_failed(dead, "gone").await?;

    let stats = store.get_stats().await?;
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.dead, 1);
    assert_eq!(stats.dead_letter, 1);
    Ok(())
}

#[tokio::test]
async fn stale_running_jobs_can_be_requeued() -> Result<()> {
    let store = JobStore::new(setup_test_db().await?);
    let id = store.create(JobKind::FullSync, json!({}), opts(0, 3)).await?;
    store.mark_running(id).await?;

    // A zero max-age treats every running row as stale.
    let requeued = store.requeue_stale_running(Duration::ZERO).await?;
    assert_eq!(requeued, 1);

    let job = store.get(id).await?;
    assert_eq!(job.status, JobStatus::Pending.as_str());
    // The interrupted attempt stays counted.
    assert_eq!(job.attempts, 1);
    Ok(())
}
