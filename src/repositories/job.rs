//! # Job Store
//!
//! Repository operations for the jobs table and its companion dead-letter
//! queue. This is the only place job state transitions are performed; the
//! legal transitions are:
//!
//! | from | operation | to |
//! |---|---|---|
//! | pending | mark_running | running |
//! | running | mark_completed | completed |
//! | running | mark_failed (attempts < max) | failed |
//! | running | mark_failed (attempts ≥ max) | dead (+ dead-letter row) |
//! | failed | reschedule | pending |
//! | dead | retry_dead_job | pending (− dead-letter row) |
//!
//! The dead-letter insert commits in the same transaction as the status flip
//! to `dead`, and `retry_dead_job` deletes the entry in the same transaction
//! that resets the job.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::dead_letter;
use crate::models::job::{self, JobKind, JobStatus};

/// Options accepted when enqueueing a job.
#[derive(Debug, Clone)]
pub struct CreateJobOptions {
    /// Scheduling priority, higher values dispatch first
    pub priority: i16,
    /// Ceiling on start events before dead-lettering
    pub max_attempts: i32,
    /// Earliest dispatch time; `None` means immediately
    pub scheduled_at: Option<chrono::DateTime<Utc>>,
}

impl Default for CreateJobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            max_attempts: 3,
            scheduled_at: None,
        }
    }
}

/// Per-status job counts plus the dead-letter backlog size.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
    pub dead_letter: u64,
}

/// Repository for job and dead-letter database operations
#[derive(Clone)]
pub struct JobStore {
    db: DatabaseConnection,
}

impl JobStore {
    /// Create a new JobStore over the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Enqueue a new job in `pending` and return its id.
    pub async fn create(
        &self,
        kind: JobKind,
        payload: JsonValue,
        opts: CreateJobOptions,
    ) -> Result<Uuid> {
        let now = Utc::now().fixed_offset();
        let scheduled_at = opts
            .scheduled_at
            .map(|dt| dt.fixed_offset())
            .unwrap_or(now);
        let id = Uuid::new_v4();

        let model = job::ActiveModel {
            id: Set(id),
            job_type: Set(kind.as_str().to_string()),
            payload: Set(payload),
            status: Set(JobStatus::Pending.as_str().to_string()),
            priority: Set(opts.priority),
            attempts: Set(0),
            max_attempts: Set(opts.max_attempts),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            scheduled_at: Set(scheduled_at),
            started_at: Set(None),
            completed_at: Set(None),
        };
        model.insert(&self.db).await?;

        tracing::info!(
            job_id = %id,
            job_type = %kind,
            priority = opts.priority,
            "Job enqueued"
        );

        Ok(id)
    }

    /// Find a job by id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<job::Model>> {
        Ok(job::Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Find a job by id, failing if it does not exist.
    pub async fn get(&self, id: Uuid) -> Result<job::Model> {
        self.find_by_id(id).await?.ok_or(SyncError::JobNotFound {
            job_id: id.to_string(),
        })
    }

    /// Dispatch selection: pending jobs whose scheduled time has passed,
    /// highest priority first, FIFO within a priority.
    pub async fn find_pending_jobs(&self, limit: u64) -> Result<Vec<job::Model>> {
        let now = Utc::now().fixed_offset();
        Ok(job::Entity::find()
            .filter(job::Column::Status.eq(JobStatus::Pending.as_str()))
            .filter(job::Column::ScheduledAt.lte(now))
            .order_by_desc(job::Column::Priority)
            .order_by_asc(job::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    /// List jobs in a given status, most recently updated first.
    pub async fn find_by_status(&self, status: JobStatus, limit: u64) -> Result<Vec<job::Model>> {
        Ok(job::Entity::find()
            .filter(job::Column::Status.eq(status.as_str()))
            .order_by_desc(job::Column::UpdatedAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    /// Claim a pending job: pending → running, counting a start event.
    pub async fn mark_running(&self, id: Uuid) -> Result<job::Model> {
        let job = self.get(id).await?;
        self.expect_status(&job, JobStatus::Pending, "mark_running")?;

        let now = Utc::now().fixed_offset();
        let attempts = job.attempts;
        let mut active: job::ActiveModel = job.into();
        active.status = Set(JobStatus::Running.as_str().to_string());
        active.attempts = Set(attempts + 1);
        active.started_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(active.update(&self.db).await?)
    }

    /// running → completed.
    pub async fn mark_completed(&self, id: Uuid) -> Result<job::Model> {
        let job = self.get(id).await?;
        self.expect_status(&job, JobStatus::Running, "mark_completed")?;

        let now = Utc::now().fixed_offset();
        let mut active: job::ActiveModel = job.into();
        active.status = Set(JobStatus::Completed.as_str().to_string());
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(active.update(&self.db).await?)
    }

    /// Record a handler failure. With budget remaining the job lands in
    /// `failed` awaiting a reschedule; at the ceiling it is dead-lettered.
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<job::Model> {
        let txn = self.db.begin().await?;

        let job = job::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(SyncError::JobNotFound {
                job_id: id.to_string(),
            })?;
        self.expect_status(&job, JobStatus::Running, "mark_failed")?;

        let now = Utc::now().fixed_offset();
        let exhausted = job.attempts >= job.max_attempts;

        if exhausted {
            let entry = dead_letter::ActiveModel {
                id: Set(Uuid::new_v4()),
                job_id: Set(job.id),
                job_type: Set(job.job_type.clone()),
                payload: Set(job.payload.clone()),
                error_message: Set(error.to_string()),
                failed_at: Set(now),
            };
            entry.insert(&txn).await?;
        }

        let attempts = job.attempts;
        let max_attempts = job.max_attempts;
        let mut active: job::ActiveModel = job.into();
        active.status = Set(if exhausted {
            JobStatus::Dead.as_str().to_string()
        } else {
            JobStatus::Failed.as_str().to_string()
        });
        active.last_error = Set(Some(error.to_string()));
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        if exhausted {
            metrics::counter!("jobs_dead_lettered_total").increment(1);
            tracing::warn!(
                job_id = %id,
                attempts,
                max_attempts,
                error,
                "Job exhausted retry budget, moved to dead-letter queue"
            );
        }

        Ok(updated)
    }

    /// failed → pending with a delayed eligibility time.
    pub async fn reschedule(&self, id: Uuid, delay: Duration) -> Result<job::Model> {
        let job = self.get(id).await?;
        self.expect_status(&job, JobStatus::Failed, "reschedule")?;

        let now = Utc::now();
        let scheduled_at = now + chrono::Duration::milliseconds(delay.as_millis() as i64);

        let mut active: job::ActiveModel = job.into();
        active.status = Set(JobStatus::Pending.as_str().to_string());
        active.scheduled_at = Set(scheduled_at.fixed_offset());
        active.updated_at = Set(now.fixed_offset());
        Ok(active.update(&self.db).await?)
    }

    /// List dead-letter entries, most recent failures first.
    pub async fn get_dead_letter_jobs(&self, limit: u64) -> Result<Vec<dead_letter::Model>> {
        Ok(dead_letter::Entity::find()
            .order_by_desc(dead_letter::Column::FailedAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    /// Operator-initiated retry of a dead job: deletes the dead-letter entry
    /// and returns the job to `pending` with a fresh attempt budget.
    pub async fn retry_dead_job(&self, dead_letter_id: Uuid) -> Result<job::Model> {
        let txn = self.db.begin().await?;

        let entry = dead_letter::Entity::find_by_id(dead_letter_id)
            .one(&txn)
            .await?
            .ok_or(SyncError::JobNotFound {
                job_id: dead_letter_id.to_string(),
            })?;

        let job = job::Entity::find_by_id(entry.job_id)
            .one(&txn)
            .await?
            .ok_or(SyncError::JobNotFound {
                job_id: entry.job_id.to_string(),
            })?;
        self.expect_status(&job, JobStatus::Dead, "retry_dead_job")?;

        dead_letter::Entity::delete_by_id(dead_letter_id)
            .exec(&txn)
            .await?;

        let now = Utc::now().fixed_offset();
        let job_id = job.id;
        let mut active: job::ActiveModel = job.into();
        active.status = Set(JobStatus::Pending.as_str().to_string());
        active.attempts = Set(0);
        active.last_error = Set(None);
        active.scheduled_at = Set(now);
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        tracing::info!(job_id = %job_id, "Dead job re-enqueued by operator");

        Ok(updated)
    }

    /// Per-status counts plus the dead-letter backlog size.
    pub async fn get_stats(&self) -> Result<JobStats> {
        let mut stats = JobStats::default();
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Dead,
        ] {
            let count = job::Entity::find()
                .filter(job::Column::Status.eq(status.as_str()))
                .count(&self.db)
                .await?;
            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Running => stats.running = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
                JobStatus::Dead => stats.dead = count,
            }
        }
        stats.dead_letter = dead_letter::Entity::find().count(&self.db).await?;
        Ok(stats)
    }

    /// Startup recovery: return `running` rows older than `max_age` to
    /// `pending`. The interrupted attempt stays counted. Returns the number
    /// of jobs re-queued.
    pub async fn requeue_stale_running(&self, max_age: Duration) -> Result<u64> {
        let cutoff =
            (Utc::now() - chrono::Duration::milliseconds(max_age.as_millis() as i64)).fixed_offset();
        let stale = job::Entity::find()
            .filter(job::Column::Status.eq(JobStatus::Running.as_str()))
            .filter(job::Column::StartedAt.lte(cutoff))
            .all(&self.db)
            .await?;

        let count = stale.len() as u64;
        let now = Utc::now().fixed_offset();
        for job in stale {
            let job_id = job.id;
            let mut active: job::ActiveModel = job.into();
            active.status = Set(JobStatus::Pending.as_str().to_string());
            active.scheduled_at = Set(now);
            active.updated_at = Set(now);
            active.update(&self.db).await?;
            tracing::warn!(job_id = %job_id, "Re-queued stale running job from a previous process");
        }

        Ok(count)
    }

    fn expect_status(&self, job: &job::Model, expected: JobStatus, op: &str) -> Result<()> {
        let actual = JobStatus::from_str(&job.status)?;
        if actual != expected {
            return Err(SyncError::Policy(format!(
                "{} requires a {} job, but job {} is {}",
                op, expected, job.id, actual
            )));
        }
        Ok(())
    }
}
