//! Task queue over the `tasks` broker table.
//!
//! Producers call [`TaskQueue::enqueue`]; consumers pull [`Delivery`] values
//! with [`TaskQueue::dequeue`] or [`TaskQueue::next_delivery`] and settle
//! them with [`TaskQueue::ack`] / [`TaskQueue::fail`]. Payloads are decoded
//! and validated here, so a malformed entry is marked `FAILURE` and reported
//! as [`QueueError::MalformedPayload`] instead of reaching the worker.
//!
//! Task results are stored as JSON text: a structured value on success and
//! a JSON string carrying the error message on failure.

use std::time::Duration;

use chrono::TimeDelta;
use serde::Serialize;
use sqlx::SqliteExecutor;
use tokio_util::sync::CancellationToken;
use trace_core::error::CoreError;
use trace_core::payload::{PayloadError, TaskPayload};
use trace_core::status::TaskStatus;
use trace_db::repositories::TaskRepo;
use trace_db::DbPool;

use crate::config::QueueConfig;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The entry could not be decoded into a [`TaskPayload`]. The task has
    /// already been marked `FAILURE`.
    #[error("task {task_id} has a malformed payload: {source}")]
    MalformedPayload {
        task_id: String,
        #[source]
        source: PayloadError,
    },

    #[error("failed to encode task payload: {0}")]
    Encode(#[from] PayloadError),

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A claimed task ready for processing.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task_id: String,
    pub payload: TaskPayload,
    /// 1 on first delivery, higher after redelivery.
    pub attempt: i64,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Queue-level view of a task, independent of the job's domain status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatusView {
    pub task_id: String,
    pub status: TaskStatus,
    pub result: serde_json::Value,
}

/// Handle to the task broker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    pool: DbPool,
    config: QueueConfig,
}

impl TaskQueue {
    pub fn new(pool: DbPool, config: QueueConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Append a task and return its queue-assigned id.
    pub async fn enqueue(&self, payload: &TaskPayload) -> Result<String, QueueError> {
        Self::enqueue_on(&self.pool, payload).await
    }

    /// [`enqueue`](Self::enqueue) on a caller-supplied executor, so the
    /// insert can join an open transaction.
    pub async fn enqueue_on<'e>(
        executor: impl SqliteExecutor<'e>,
        payload: &TaskPayload,
    ) -> Result<String, QueueError> {
        let raw = payload.encode()?;
        let task = TaskRepo::enqueue(executor, payload.job_id, &raw).await?;
        tracing::debug!(task_id = %task.task_id, job_id = payload.job_id, "Task enqueued");
        Ok(task.task_id)
    }

    /// Claim one task if any is deliverable. Does not wait.
    pub async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let Some(record) = TaskRepo::claim_next(&self.pool, self.lease()).await? else {
            return Ok(None);
        };

        let decoded = TaskPayload::decode(&record.payload).and_then(|payload| {
            if payload.job_id == record.job_id {
                Ok(payload)
            } else {
                Err(PayloadError::Invalid(CoreError::Validation(format!(
                    "payload job_id {} does not match task job_id {}",
                    payload.job_id, record.job_id
                ))))
            }
        });

        match decoded {
            Ok(payload) => Ok(Some(Delivery {
                task_id: record.task_id,
                payload,
                attempt: record.attempts,
            })),
            Err(source) => {
                tracing::warn!(
                    task_id = %record.task_id,
                    error = %source,
                    "Rejecting malformed task payload",
                );
                self.fail(&record.task_id, &source.to_string()).await?;
                Err(QueueError::MalformedPayload {
                    task_id: record.task_id,
                    source,
                })
            }
        }
    }

    /// Poll until a task is delivered. Returns `None` once `cancel` fires.
    pub async fn next_delivery(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Delivery>, QueueError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(delivery) = self.dequeue().await? {
                return Ok(Some(delivery));
            }
            tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Mark a task `SUCCESS` with a structured result.
    pub async fn ack(&self, task_id: &str, result: &serde_json::Value) -> Result<bool, QueueError> {
        Self::finish_on(&self.pool, task_id, TaskStatus::Success, result).await
    }

    /// Mark a task `FAILURE` with an error message.
    pub async fn fail(&self, task_id: &str, message: &str) -> Result<bool, QueueError> {
        let result = serde_json::Value::String(message.to_string());
        Self::finish_on(&self.pool, task_id, TaskStatus::Failure, &result).await
    }

    /// Record a terminal queue status on a caller-supplied executor.
    ///
    /// Returns `false` if the task was already finished; the first terminal
    /// record wins.
    pub async fn finish_on<'e>(
        executor: impl SqliteExecutor<'e>,
        task_id: &str,
        status: TaskStatus,
        result: &serde_json::Value,
    ) -> Result<bool, QueueError> {
        let finished =
            TaskRepo::finish(executor, task_id, status, Some(&result.to_string())).await?;
        if !finished {
            tracing::debug!(task_id, %status, "Task already finished, result not overwritten");
        }
        Ok(finished)
    }

    /// Renew the lease on a task still being processed. Returns `false` if
    /// the task is no longer held.
    pub async fn heartbeat(&self, task_id: &str) -> Result<bool, QueueError> {
        Ok(TaskRepo::extend_lease(&self.pool, task_id, self.lease()).await?)
    }

    /// Current queue status and result of a task.
    pub async fn query(&self, task_id: &str) -> Result<TaskStatusView, QueueError> {
        let record = TaskRepo::find_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()))?;

        Ok(TaskStatusView {
            task_id: record.task_id,
            status: record.status,
            result: record.result.as_deref().map_or(serde_json::Value::Null, parse_result),
        })
    }

    fn lease(&self) -> TimeDelta {
        lease_delta(self.config.lease)
    }
}

/// Stored results are JSON; anything else is surfaced as a plain string.
fn parse_result(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn lease_delta(lease: Duration) -> TimeDelta {
    TimeDelta::from_std(lease).unwrap_or(TimeDelta::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
