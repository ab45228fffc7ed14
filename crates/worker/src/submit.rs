//! Job submission: record the job and hand it to the queue.

use serde::{Deserialize, Serialize};
use trace_core::error::CoreError;
use trace_core::payload::{validate_input_path, validate_sample_id, DataType, TaskPayload};
use trace_core::types::DbId;
use trace_db::models::job::{CreateJob, JobView};
use trace_db::repositories::JobRepo;

use crate::error::ServiceError;
use crate::queue::{QueueError, TaskQueue};

/// Descriptor of a unit of work as supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSubmission {
    pub sample_id: String,
    pub input_path: String,
    pub data_type: DataType,
}

/// The recorded job and the id of the task carrying it.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub job: JobView,
    pub task_id: String,
}

/// Creates jobs and enqueues their tasks.
#[derive(Debug, Clone)]
pub struct Submitter {
    queue: TaskQueue,
}

impl Submitter {
    pub fn new(queue: TaskQueue) -> Self {
        Self { queue }
    }

    /// Record a `pending` job and enqueue its task in one transaction, so a
    /// job never exists without a task to drive it. Returns without waiting
    /// for any processing.
    pub async fn submit(
        &self,
        owner_id: DbId,
        input: NewSubmission,
    ) -> Result<Submission, ServiceError> {
        validate_sample_id(&input.sample_id)?;
        validate_input_path(&input.input_path)?;

        let mut tx = self.queue.pool().begin().await?;

        let job = JobRepo::create(
            &mut *tx,
            &CreateJob {
                owner_id,
                sample_id: input.sample_id,
                input_path: input.input_path,
                data_type: input.data_type,
            },
        )
        .await?;

        let payload = TaskPayload::new(job.id, &job.input_path, &job.sample_id, job.data_type);
        let task_id = TaskQueue::enqueue_on(&mut *tx, &payload)
            .await
            .map_err(|e| match e {
                QueueError::Database(db) => ServiceError::Database(db),
                other => ServiceError::Core(CoreError::Internal(other.to_string())),
            })?;

        tx.commit().await?;

        tracing::info!(
            job_id = job.id,
            task_id = %task_id,
            owner_id,
            sample_id = %job.sample_id,
            data_type = %job.data_type,
            "Job submitted",
        );

        Ok(Submission {
            job: job.into(),
            task_id,
        })
    }
}
