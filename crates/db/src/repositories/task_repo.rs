//! Repository for the `tasks` table (the broker).
//!
//! Delivery is at-least-once: a claimed task carries a lease, and a task
//! whose lease expires while still `STARTED` becomes claimable again.
//! Finished tasks keep their status and result until purged, which makes
//! the table double as the result backend for status queries.

use chrono::{TimeDelta, Utc};
use sqlx::{SqliteExecutor, SqlitePool};
use trace_core::status::TaskStatus;
use trace_core::types::{DbId, Timestamp};

use crate::models::task::TaskRecord;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    task_id, job_id, payload, status, result, attempts, \
    enqueued_at, claimed_at, lease_expires_at, finished_at";

/// Upper bound on a single lease. Keeps deadlines inside the four-digit
/// years so stored timestamps compare correctly as text.
const MAX_LEASE_DAYS: i64 = 365;

/// Provides queue operations over the `tasks` table.
pub struct TaskRepo;

impl TaskRepo {
    /// Append a task to the queue. The task id is a fresh UUID, unrelated
    /// to the job id.
    pub async fn enqueue<'e>(
        executor: impl SqliteExecutor<'e>,
        job_id: DbId,
        payload: &str,
    ) -> Result<TaskRecord, sqlx::Error> {
        let task_id = uuid::Uuid::new_v4().to_string();
        let query = format!(
            "INSERT INTO tasks (task_id, job_id, payload, status, enqueued_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskRecord>(&query)
            .bind(task_id)
            .bind(job_id)
            .bind(payload)
            .bind(TaskStatus::Pending.as_str())
            .bind(Utc::now())
            .fetch_one(executor)
            .await
    }

    /// Atomically claim the oldest deliverable task.
    ///
    /// Deliverable means `PENDING`, or `STARTED` with an expired lease (the
    /// previous holder is presumed dead). The single `UPDATE` takes SQLite's
    /// write lock, so two workers can never claim the same task at once.
    pub async fn claim_next(
        pool: &SqlitePool,
        lease: TimeDelta,
    ) -> Result<Option<TaskRecord>, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "UPDATE tasks \
             SET status = ?1, claimed_at = ?2, lease_expires_at = ?3, attempts = attempts + 1 \
             WHERE task_id = ( \
                 SELECT task_id FROM tasks \
                 WHERE status = ?4 OR (status = ?1 AND lease_expires_at < ?2) \
                 ORDER BY enqueued_at ASC, rowid ASC \
                 LIMIT 1 \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskRecord>(&query)
            .bind(TaskStatus::Started.as_str())
            .bind(now)
            .bind(lease_deadline(now, lease))
            .bind(TaskStatus::Pending.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Push the lease of a running task forward. Returns `false` if the task
    /// is no longer `STARTED`.
    pub async fn extend_lease<'e>(
        executor: impl SqliteExecutor<'e>,
        task_id: &str,
        lease: TimeDelta,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET lease_expires_at = ? WHERE task_id = ? AND status = ?",
        )
        .bind(lease_deadline(Utc::now(), lease))
        .bind(task_id)
        .bind(TaskStatus::Started.as_str())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the final queue status and result of a task.
    ///
    /// Only unfinished tasks are updated; the first terminal record wins.
    /// Returns `false` if the task is missing or already finished.
    pub async fn finish<'e>(
        executor: impl SqliteExecutor<'e>,
        task_id: &str,
        status: TaskStatus,
        outcome: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        debug_assert!(status.is_terminal(), "finish requires a terminal status");
        let result = sqlx::query(
            "UPDATE tasks \
             SET status = ?, result = ?, finished_at = ?, lease_expires_at = NULL \
             WHERE task_id = ? AND status IN (?, ?)",
        )
        .bind(status.as_str())
        .bind(outcome)
        .bind(Utc::now())
        .bind(task_id)
        .bind(TaskStatus::Pending.as_str())
        .bind(TaskStatus::Started.as_str())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a task by its queue id.
    pub async fn find_by_id<'e>(
        executor: impl SqliteExecutor<'e>,
        task_id: &str,
    ) -> Result<Option<TaskRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE task_id = ?");
        sqlx::query_as::<_, TaskRecord>(&query)
            .bind(task_id)
            .fetch_optional(executor)
            .await
    }

    /// Number of tasks currently in `status`.
    pub async fn count_by_status(
        pool: &SqlitePool,
        status: TaskStatus,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(pool)
            .await
    }

    /// Delete finished tasks whose `finished_at` is older than `cutoff`.
    /// Returns the number of rows removed.
    pub async fn purge_finished_before(
        pool: &SqlitePool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM tasks WHERE status IN (?, ?) AND finished_at < ?",
        )
        .bind(TaskStatus::Success.as_str())
        .bind(TaskStatus::Failure.as_str())
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// `now + lease`, with the lease capped at [`MAX_LEASE_DAYS`].
fn lease_deadline(now: Timestamp, lease: TimeDelta) -> Timestamp {
    now + lease.min(TimeDelta::days(MAX_LEASE_DAYS))
}
