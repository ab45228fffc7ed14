//! Runner interface and shared types.
//!
//! Defines [`PipelineRunner`], the seam between the worker and whatever
//! executes the analysis, along with [`RunRequest`], [`RunOutput`], and
//! [`RunError`].

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use trace_core::payload::DataType;

/// Everything needed to run the pipeline for one job.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub sample_id: String,
    pub input_path: String,
    pub data_type: DataType,
    /// Per-job sample manifest, already written by the caller.
    pub manifest_path: PathBuf,
    /// Wall-clock limit; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Outcome of a pipeline process that ran to exit.
///
/// A non-zero `exit_code` is still an `Ok` output: the runner reports the
/// code and leaves interpretation to the caller.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Target the pipeline was asked to produce.
    pub output_path: PathBuf,
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by a signal).
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// `true` if either stream exceeded the capture limit and lost its head.
    pub truncated: bool,
}

impl RunOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Failures that prevented the process from running to exit.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while waiting for the pipeline: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("pipeline run was cancelled")]
    Cancelled,
}

/// Executes the external pipeline for one request.
///
/// Implementations hold no state between calls and must tolerate being
/// invoked repeatedly with the same request.
pub trait PipelineRunner: Send + Sync {
    /// Short human-readable name used in job result messages.
    fn name(&self) -> &str;

    /// Run the pipeline to completion, a timeout, or cancellation.
    fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<RunOutput, RunError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
