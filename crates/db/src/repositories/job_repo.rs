//! Repository for the `jobs` table (the job store).
//!
//! Every status write goes through [`JobRepo::transition`], which encodes the
//! lifecycle rules of [`JobStatus::can_transition_to`] in the `WHERE` clause
//! of a single `UPDATE`. Status and result are therefore always written
//! together, and a terminal job can never be moved again no matter how many
//! workers race on it.

use chrono::Utc;
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};
use trace_core::status::JobStatus;
use trace_core::types::DbId;

use crate::models::job::{CreateJob, Job, JobListQuery};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner_id, status, sample_id, input_path, data_type, \
    result, created_at, updated_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Why a status write was not applied.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("job {0} not found")]
    NotFound(DbId),

    #[error("job {job_id} cannot move from {current} to {requested}")]
    Rejected {
        job_id: DbId,
        current: JobStatus,
        requested: JobStatus,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Provides CRUD and lifecycle operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Record a new job in `pending` status.
    pub async fn create<'e>(
        executor: impl SqliteExecutor<'e>,
        input: &CreateJob,
    ) -> Result<Job, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "INSERT INTO jobs (owner_id, status, sample_id, input_path, data_type, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.owner_id)
            .bind(JobStatus::Pending.as_str())
            .bind(&input.sample_id)
            .bind(&input.input_path)
            .bind(input.data_type.as_str())
            .bind(now)
            .bind(now)
            .fetch_one(executor)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id<'e>(
        executor: impl SqliteExecutor<'e>,
        id: DbId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Move a job to `next` and overwrite its result, inside the caller's
    /// transaction.
    ///
    /// The update only matches rows whose current status is a legal
    /// predecessor of `next`. When nothing matches, the row is re-read to
    /// report whether the job is missing or the transition was rejected;
    /// in both cases nothing is written.
    pub async fn transition(
        conn: &mut SqliteConnection,
        id: DbId,
        next: JobStatus,
        result: &str,
    ) -> Result<Job, TransitionError> {
        let allowed = JobStatus::predecessors(next);
        let placeholders = vec!["?"; allowed.len()].join(", ");
        let query = format!(
            "UPDATE jobs SET status = ?, result = ?, updated_at = ? \
             WHERE id = ? AND status IN ({placeholders}) \
             RETURNING {COLUMNS}"
        );

        let mut update = sqlx::query_as::<_, Job>(&query)
            .bind(next.as_str())
            .bind(result)
            .bind(Utc::now())
            .bind(id);
        for status in &allowed {
            update = update.bind(status.as_str());
        }

        if let Some(job) = update.fetch_optional(&mut *conn).await? {
            return Ok(job);
        }

        match Self::find_by_id(&mut *conn, id).await? {
            None => Err(TransitionError::NotFound(id)),
            Some(current) => Err(TransitionError::Rejected {
                job_id: id,
                current: current.status,
                requested: next,
            }),
        }
    }

    /// Atomically set status and result in a transaction of their own.
    pub async fn set_status(
        pool: &SqlitePool,
        id: DbId,
        next: JobStatus,
        result: &str,
    ) -> Result<Job, TransitionError> {
        let mut tx = pool.begin().await?;
        let job = Self::transition(&mut tx, id, next, result).await?;
        tx.commit().await?;
        Ok(job)
    }

    /// List jobs for one owner, newest first, with optional status filter.
    pub async fn list_by_owner(
        pool: &SqlitePool,
        owner_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let status_clause = if params.status.is_some() {
            " AND status = ?"
        } else {
            ""
        };
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE owner_id = ?{status_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ? OFFSET ?"
        );

        let mut select = sqlx::query_as::<_, Job>(&query).bind(owner_id);
        if let Some(status) = params.status {
            select = select.bind(status.as_str());
        }
        select.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Delete a job. Returns `true` if a row was removed.
    ///
    /// Authorization and the terminal-state check are the caller's job.
    pub async fn delete<'e>(
        executor: impl SqliteExecutor<'e>,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
