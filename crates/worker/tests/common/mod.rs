#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use trace_core::payload::DataType;
use trace_core::status::JobStatus;
use trace_pipeline::{PipelineRunner, RunError, RunOutput, RunRequest};
use trace_worker::config::QueueConfig;
use trace_worker::queue::TaskQueue;
use trace_worker::submit::{NewSubmission, Submission, Submitter};
use trace_worker::worker::{Worker, WorkerSettings};

/// What the stub pipeline does when run.
#[derive(Debug, Clone)]
pub enum StubBehavior {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// Sleep, then exit 0.
    Slow(Duration),
    Timeout(u64),
    SpawnFailure,
    /// Block until cancelled.
    Hang,
}

/// State seen by the stub while it was running.
#[derive(Debug, Clone)]
pub struct Observation {
    pub sample_id: String,
    pub manifest_path: PathBuf,
    pub manifest_existed: bool,
    /// Whether the manifest was still on disk when the run ended.
    pub manifest_kept: bool,
    pub job_status: Option<String>,
}

/// Pipeline stand-in. Produces `/out/<sample_id>.tsv` and records what it
/// saw on every call.
pub struct StubRunner {
    behavior: StubBehavior,
    pool: SqlitePool,
    observations: Arc<Mutex<Vec<Observation>>>,
}

impl StubRunner {
    pub fn new(pool: SqlitePool, behavior: StubBehavior) -> Self {
        Self {
            behavior,
            pool,
            observations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn observations(&self) -> Arc<Mutex<Vec<Observation>>> {
        Arc::clone(&self.observations)
    }

    fn output(&self, request: &RunRequest, code: i32, stdout: &str, stderr: &str) -> RunOutput {
        RunOutput {
            output_path: PathBuf::from(format!("/out/{}.tsv", request.sample_id)),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: code,
            duration_ms: 1,
            truncated: false,
        }
    }
}

impl PipelineRunner for StubRunner {
    fn name(&self) -> &str {
        "Stub"
    }

    async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError> {
        let job_status: Option<String> =
            sqlx::query_scalar("SELECT status FROM jobs WHERE sample_id = ?")
                .bind(&request.sample_id)
                .fetch_optional(&self.pool)
                .await
                .expect("read job status");

        let manifest_existed = request.manifest_path.exists();

        let result = match &self.behavior {
            StubBehavior::Exit {
                code,
                stdout,
                stderr,
            } => Ok(self.output(request, *code, stdout, stderr)),
            StubBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(self.output(request, 0, "", ""))
            }
            StubBehavior::Timeout(elapsed_ms) => Err(RunError::Timeout {
                elapsed_ms: *elapsed_ms,
            }),
            StubBehavior::SpawnFailure => Err(RunError::Spawn {
                program: "snakemake".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            StubBehavior::Hang => {
                cancel.cancelled().await;
                Err(RunError::Cancelled)
            }
        };

        self.observations
            .lock()
            .expect("observations lock")
            .push(Observation {
                sample_id: request.sample_id.clone(),
                manifest_path: request.manifest_path.clone(),
                manifest_existed,
                manifest_kept: request.manifest_path.exists(),
                job_status,
            });

        result
    }
}

pub fn succeed() -> StubBehavior {
    StubBehavior::Exit {
        code: 0,
        stdout: "done\n".to_string(),
        stderr: String::new(),
    }
}

pub fn queue(pool: &SqlitePool) -> TaskQueue {
    TaskQueue::new(
        pool.clone(),
        QueueConfig {
            lease: Duration::from_secs(300),
            poll_interval: Duration::from_millis(20),
        },
    )
}

pub fn worker(queue: TaskQueue, runner: StubRunner, scratch_dir: &Path) -> Worker<StubRunner> {
    Worker::new(
        queue,
        runner,
        WorkerSettings {
            scratch_dir: scratch_dir.to_path_buf(),
            pipeline_timeout: None,
        },
    )
}

pub async fn submit(queue: &TaskQueue, owner_id: i64, sample_id: &str) -> Submission {
    Submitter::new(queue.clone())
        .submit(
            owner_id,
            NewSubmission {
                sample_id: sample_id.to_string(),
                input_path: format!("/data/uploads/{sample_id}.bam"),
                data_type: DataType::Wgs,
            },
        )
        .await
        .expect("submit")
}

pub async fn job_status(pool: &SqlitePool, job_id: i64) -> JobStatus {
    trace_db::repositories::JobRepo::find_by_id(pool, job_id)
        .await
        .expect("find job")
        .expect("job exists")
        .status
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer lock")).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Record log events on the current thread until the guard is dropped.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
