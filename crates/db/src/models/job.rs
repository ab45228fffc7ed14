//! Job entity models and DTOs for the job store.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use trace_core::payload::DataType;
use trace_core::status::JobStatus;
use trace_core::types::{DbId, Timestamp};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub owner_id: DbId,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub sample_id: String,
    pub input_path: String,
    #[sqlx(try_from = "String")]
    pub data_type: DataType,
    pub result: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The projection of a job returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: DbId,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub result: Option<String>,
    pub owner_id: DbId,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            created_at: job.created_at,
            result: job.result,
            owner_id: job.owner_id,
        }
    }
}

/// DTO for recording a newly submitted job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJob {
    pub owner_id: DbId,
    pub sample_id: String,
    pub input_path: String,
    pub data_type: DataType,
}

/// Query parameters for listing an owner's jobs.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status (e.g. `failed`).
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
