//! Worker: drives one job through its lifecycle per delivered task.
//!
//! ```text
//! pending ──► running ──► complete
//!    │           │
//!    └───────────┴──────► failed
//! ```
//!
//! For each [`Delivery`]:
//!
//! 1. Read the job. If it is gone, fail the task and leave the job store
//!    untouched.
//! 2. If the job is already terminal (a redelivery after the earlier attempt
//!    committed), settle the task to match and stop.
//! 3. Commit `running` with the "has started" message before the pipeline
//!    starts.
//! 4. Write the sample manifest, run the pipeline while renewing the task
//!    lease, and drop the manifest on every exit path.
//! 5. Commit the terminal job status and the task's terminal queue status
//!    in one transaction.
//!
//! Every failure is recorded on the job first and then returned to the
//! caller as a [`WorkerError`], so the queue's view reflects it as well.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use trace_core::status::{JobStatus, TaskStatus};
use trace_core::types::DbId;
use trace_db::models::job::Job;
use trace_db::repositories::{JobRepo, TransitionError};
use trace_pipeline::{PipelineRunner, RunError, RunOutput, RunRequest, SampleManifest};
use tracing::Instrument;

use crate::queue::{Delivery, QueueError, TaskQueue};

/// Upper bound on the text stored in a job's `result` (64 KiB).
pub const MAX_RESULT_BYTES: usize = 64 * 1024;

/// Marker prefixed to an output stream whose head was cut.
const TRUNCATION_MARKER: &str = "[... truncated ...]\n";

/// Prefix of the result recorded on a completed job.
const SUCCESS_PREFIX: &str = "Pipeline finished successfully. Results at: ";

/// Smallest lease renewal period.
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The task referenced a job that does not exist.
    #[error("ExecutionError: job {0} not found")]
    JobNotFound(DbId),

    /// The pipeline ran but did not succeed (non-zero exit or timeout).
    #[error("ExecutionError: {message}")]
    Execution { job_id: DbId, message: String },

    /// Anything else that went wrong while handling the job.
    #[error("UnexpectedError: {message}")]
    Unexpected { job_id: DbId, message: String },

    /// Shutdown interrupted the run. The job stays `running` and the task
    /// is redelivered once its lease expires.
    #[error("processing of job {0} was interrupted")]
    Interrupted(DbId),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Per-run settings that are not part of the queue configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Directory the sample manifests are written to.
    pub scratch_dir: PathBuf,
    /// Passed through to the runner; `None` waits indefinitely.
    pub pipeline_timeout: Option<Duration>,
}

/// How the pipeline step ended, before it is recorded.
enum Conclusion {
    Completed(RunOutput),
    ExitedNonZero(RunOutput),
    TimedOut(u64),
    Interrupted,
    Unexpected(String),
}

pub struct Worker<R> {
    queue: TaskQueue,
    runner: R,
    settings: WorkerSettings,
}

impl<R: PipelineRunner> Worker<R> {
    pub fn new(queue: TaskQueue, runner: R, settings: WorkerSettings) -> Self {
        Self {
            queue,
            runner,
            settings,
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Handle one delivery to completion.
    ///
    /// Returns the completed job on success. Pipeline failures come back as
    /// [`WorkerError::Execution`] or [`WorkerError::Unexpected`] after the
    /// job has been marked `failed` and the task `FAILURE`.
    pub async fn process(
        &self,
        delivery: &Delivery,
        cancel: &CancellationToken,
    ) -> Result<Job, WorkerError> {
        let job_id = delivery.payload.job_id;
        let task_id = delivery.task_id.as_str();
        let pool = self.queue.pool();

        if delivery.is_redelivery() {
            tracing::warn!(job_id, task_id, attempt = delivery.attempt, "Task redelivered");
        }

        let Some(job) = JobRepo::find_by_id(pool, job_id).await? else {
            return self.reject_missing_job(task_id, job_id).await;
        };
        if job.status.is_terminal() {
            return self.settle_finished(task_id, job).await;
        }

        let started = format!("{} pipeline has started.", self.runner.name());
        match JobRepo::set_status(pool, job_id, JobStatus::Running, &started).await {
            Ok(_) => {}
            Err(TransitionError::NotFound(_)) => {
                return self.reject_missing_job(task_id, job_id).await;
            }
            Err(TransitionError::Rejected { current, .. }) => {
                tracing::info!(job_id, %current, "Job finished by another attempt");
                return match JobRepo::find_by_id(pool, job_id).await? {
                    Some(job) => self.settle_finished(task_id, job).await,
                    None => self.reject_missing_job(task_id, job_id).await,
                };
            }
            Err(TransitionError::Database(e)) => return Err(e.into()),
        }

        tracing::info!(
            job_id,
            task_id,
            attempt = delivery.attempt,
            sample_id = %delivery.payload.sample_id,
            "Job running",
        );

        match self.execute(delivery, cancel).await {
            Conclusion::Completed(output) => {
                let output_path = output.output_path.display().to_string();
                let message = format!("{SUCCESS_PREFIX}{output_path}");
                let task_result = success_result(&output_path);
                let job = self
                    .conclude(task_id, job_id, JobStatus::Complete, &message, &task_result)
                    .await?;
                tracing::info!(job_id, duration_ms = output.duration_ms, "Job complete");
                Ok(job)
            }
            Conclusion::ExitedNonZero(output) => {
                let message = failure_message(self.runner.name(), &output);
                self.fail_job(task_id, job_id, &message).await?;
                tracing::warn!(job_id, exit_code = output.exit_code, "Job failed");
                Err(WorkerError::Execution { job_id, message })
            }
            Conclusion::TimedOut(elapsed_ms) => {
                let message = format!(
                    "{} pipeline timed out after {elapsed_ms} ms.",
                    self.runner.name()
                );
                self.fail_job(task_id, job_id, &message).await?;
                tracing::warn!(job_id, elapsed_ms, "Job timed out");
                Err(WorkerError::Execution { job_id, message })
            }
            Conclusion::Unexpected(error) => {
                let message = format!("An unexpected error occurred: {error}");
                self.fail_job(task_id, job_id, &message).await?;
                tracing::error!(job_id, error = %error, "Job failed unexpectedly");
                Err(WorkerError::Unexpected { job_id, message })
            }
            Conclusion::Interrupted => {
                tracing::warn!(job_id, task_id, "Job interrupted, left for redelivery");
                Err(WorkerError::Interrupted(job_id))
            }
        }
    }

    /// Process deliveries until `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) {
        tracing::info!(runner = self.runner.name(), "Worker started");

        loop {
            let delivery = match self.queue.next_delivery(cancel).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => break,
                Err(QueueError::MalformedPayload { task_id, source }) => {
                    tracing::warn!(task_id = %task_id, error = %source, "Skipped malformed task");
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to poll task queue");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.queue.config().poll_interval) => continue,
                    }
                }
            };

            match self.process(&delivery, cancel).await {
                Ok(job) => {
                    tracing::debug!(job_id = job.id, task_id = %delivery.task_id, "Task done");
                }
                Err(e @ WorkerError::Database(_)) | Err(e @ WorkerError::Queue(_)) => {
                    tracing::error!(task_id = %delivery.task_id, error = %e, "Task handling failed");
                }
                Err(e) => {
                    tracing::info!(task_id = %delivery.task_id, error = %e, "Task failed");
                }
            }
        }

        tracing::info!("Worker stopped");
    }

    /// Write the manifest, run the pipeline, and classify the outcome. The
    /// manifest guard is dropped before this returns.
    async fn execute(&self, delivery: &Delivery, cancel: &CancellationToken) -> Conclusion {
        let payload = &delivery.payload;
        let manifest = match SampleManifest::write(
            &self.settings.scratch_dir,
            payload.job_id,
            &payload.sample_id,
            payload.data_type,
            &payload.input_path,
        )
        .await
        {
            Ok(manifest) => manifest,
            Err(e) => return Conclusion::Unexpected(e.to_string()),
        };

        let request = RunRequest {
            sample_id: payload.sample_id.clone(),
            input_path: payload.input_path.clone(),
            data_type: payload.data_type,
            manifest_path: manifest.path().to_path_buf(),
            timeout: self.settings.pipeline_timeout,
        };

        match self.run_with_heartbeat(&delivery.task_id, &request, cancel).await {
            Ok(output) if output.succeeded() => Conclusion::Completed(output),
            Ok(output) => Conclusion::ExitedNonZero(output),
            Err(RunError::Timeout { elapsed_ms }) => Conclusion::TimedOut(elapsed_ms),
            Err(RunError::Cancelled) => Conclusion::Interrupted,
            Err(e) => Conclusion::Unexpected(e.to_string()),
        }
    }

    /// Run the pipeline, renewing the task lease every third of its length
    /// so a long run is not redelivered to another worker.
    async fn run_with_heartbeat(
        &self,
        task_id: &str,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError> {
        let period = (self.queue.config().lease / 3).max(MIN_HEARTBEAT);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        let run = self.runner.run(request, cancel);
        tokio::pin!(run);

        loop {
            tokio::select! {
                result = &mut run => return result,
                _ = ticker.tick() => match self.queue.heartbeat(task_id).await {
                    Ok(true) => tracing::trace!(task_id, "Task lease renewed"),
                    Ok(false) => tracing::warn!(task_id, "Task lease lost while running"),
                    Err(e) => tracing::warn!(task_id, error = %e, "Failed to renew task lease"),
                },
            }
        }
    }

    /// Commit the terminal job status and the matching task status together.
    ///
    /// If the job was concluded elsewhere in the meantime, that outcome wins
    /// and the task is settled to match it instead.
    async fn conclude(
        &self,
        task_id: &str,
        job_id: DbId,
        status: JobStatus,
        message: &str,
        task_result: &serde_json::Value,
    ) -> Result<Job, WorkerError> {
        let task_status = TaskStatus::for_job(status).unwrap_or(TaskStatus::Failure);

        let mut tx = self.queue.pool().begin().await?;
        match JobRepo::transition(&mut tx, job_id, status, message).await {
            Ok(job) => {
                TaskQueue::finish_on(&mut *tx, task_id, task_status, task_result).await?;
                tx.commit().await?;
                Ok(job)
            }
            Err(TransitionError::Rejected { current, .. }) => {
                drop(tx);
                tracing::warn!(job_id, %current, requested = %status, "Job already concluded");
                match JobRepo::find_by_id(self.queue.pool(), job_id).await? {
                    Some(job) => self.settle_finished(task_id, job).await,
                    None => self.reject_missing_job(task_id, job_id).await,
                }
            }
            Err(TransitionError::NotFound(_)) => {
                drop(tx);
                self.reject_missing_job(task_id, job_id).await
            }
            Err(TransitionError::Database(e)) => Err(e.into()),
        }
    }

    async fn fail_job(&self, task_id: &str, job_id: DbId, message: &str) -> Result<(), WorkerError> {
        let task_result = serde_json::Value::String(message.to_string());
        self.conclude(task_id, job_id, JobStatus::Failed, message, &task_result)
            .await
            .map(|_| ())
    }

    /// Fail the task without touching the job store.
    async fn reject_missing_job(&self, task_id: &str, job_id: DbId) -> Result<Job, WorkerError> {
        let error = WorkerError::JobNotFound(job_id);
        tracing::warn!(job_id, task_id, "Task references a missing job");
        self.queue.fail(task_id, &error.to_string()).await?;
        Err(error)
    }

    /// Settle a task whose job is already terminal, without running again.
    async fn settle_finished(&self, task_id: &str, job: Job) -> Result<Job, WorkerError> {
        let result = job.result.clone().unwrap_or_default();
        match TaskStatus::for_job(job.status) {
            Some(TaskStatus::Success) => {
                let output_path = result.strip_prefix(SUCCESS_PREFIX).unwrap_or(&result);
                self.queue.ack(task_id, &success_result(output_path)).await?;
            }
            _ => {
                self.queue.fail(task_id, &result).await?;
            }
        }
        tracing::info!(job_id = job.id, task_id, status = %job.status, "Redelivered task settled");
        Ok(job)
    }
}

/// Run `worker` on `concurrency` parallel slots until `cancel` fires.
pub async fn run_pool<R>(worker: Arc<Worker<R>>, concurrency: usize, cancel: CancellationToken)
where
    R: PipelineRunner + 'static,
{
    let slots = concurrency.max(1);
    tracing::info!(slots, "Starting worker pool");

    let handles: Vec<_> = (0..slots)
        .map(|slot| {
            let worker = Arc::clone(&worker);
            let cancel = cancel.clone();
            tokio::spawn(
                async move { worker.run(&cancel).await }
                    .instrument(tracing::info_span!("worker_slot", slot)),
            )
        })
        .collect();

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker slot panicked");
        }
    }
}

/// Task result recorded on success.
fn success_result(output_path: &str) -> serde_json::Value {
    serde_json::json!({ "status": "Success", "output": output_path })
}

/// Failure text for a non-zero exit, with each stream cut to its tail so
/// the whole message fits in [`MAX_RESULT_BYTES`].
pub fn failure_message(runner: &str, output: &RunOutput) -> String {
    let header = format!(
        "{runner} pipeline failed (exit code {}).\nSTDOUT: ",
        output.exit_code
    );
    let separator = "\nSTDERR: ";
    let budget = MAX_RESULT_BYTES.saturating_sub(header.len() + separator.len());
    let per_stream = budget / 2;

    let stderr = tail(&output.stderr, per_stream);
    let stdout = tail(&output.stdout, budget - stderr.len());
    format!("{header}{stdout}{separator}{stderr}")
}

/// The last `max` bytes of `text` at a character boundary, prefixed with
/// [`TRUNCATION_MARKER`] when anything was cut.
fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(TRUNCATION_MARKER.len());
    let mut start = text.len() - keep;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("{TRUNCATION_MARKER}{}", &text[start..])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
