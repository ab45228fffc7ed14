//! Read-only status projection.
//!
//! Two deliberately separate views: the job store's domain status
//! ([`StatusReporter::by_job`]) and the queue's delivery bookkeeping
//! ([`StatusReporter::by_task`]). They use different vocabularies but agree
//! on terminal versus non-terminal, since the worker commits both terminal
//! records together.

use trace_core::error::CoreError;
use trace_core::types::DbId;
use trace_db::models::job::{JobListQuery, JobView};
use trace_db::repositories::JobRepo;

use crate::error::ServiceError;
use crate::queue::{QueueError, TaskQueue, TaskStatusView};

#[derive(Debug, Clone)]
pub struct StatusReporter {
    queue: TaskQueue,
}

impl StatusReporter {
    pub fn new(queue: TaskQueue) -> Self {
        Self { queue }
    }

    pub async fn by_job(&self, job_id: DbId) -> Result<JobView, ServiceError> {
        let job = JobRepo::find_by_id(self.queue.pool(), job_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Job",
                id: job_id,
            })?;
        Ok(job.into())
    }

    pub async fn by_task(&self, task_id: &str) -> Result<TaskStatusView, ServiceError> {
        self.queue.query(task_id).await.map_err(|e| match e {
            QueueError::TaskNotFound(id) => ServiceError::TaskNotFound(id),
            QueueError::Database(db) => ServiceError::Database(db),
            other => ServiceError::Core(CoreError::Internal(other.to_string())),
        })
    }

    /// An owner's jobs, newest first.
    pub async fn list_for_owner(
        &self,
        owner_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<JobView>, ServiceError> {
        let jobs = JobRepo::list_by_owner(self.queue.pool(), owner_id, params).await?;
        Ok(jobs.into_iter().map(JobView::from).collect())
    }

    /// Remove a finished job.
    ///
    /// A job that is still pending or running is refused with a conflict:
    /// its task may be in flight and would otherwise find the record gone.
    pub async fn delete_job(&self, job_id: DbId) -> Result<(), ServiceError> {
        let mut tx = self.queue.pool().begin().await?;

        let job = JobRepo::find_by_id(&mut *tx, job_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Job",
                id: job_id,
            })?;

        if !job.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Job {job_id} is {} and cannot be deleted until it finishes",
                job.status
            ))
            .into());
        }

        JobRepo::delete(&mut *tx, job_id).await?;
        tx.commit().await?;

        tracing::info!(job_id, "Job deleted");
        Ok(())
    }
}
