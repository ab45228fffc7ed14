//! Queue task models.

use serde::Serialize;
use sqlx::FromRow;
use trace_core::status::TaskStatus;
use trace_core::types::{DbId, Timestamp};

/// A row from the `tasks` table.
///
/// `payload` is the raw JSON as enqueued; it is validated into a
/// `TaskPayload` at the queue boundary, not here.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub job_id: DbId,
    pub payload: String,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    pub result: Option<String>,
    pub attempts: i64,
    pub enqueued_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub lease_expires_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}
