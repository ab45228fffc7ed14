//! Snakemake runner.
//!
//! Builds the pipeline command line from the request and delegates process
//! handling to [`subprocess::run_command`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use super::executor::{PipelineRunner, RunError, RunOutput, RunRequest};
use super::subprocess;

/// Version tag embedded in output file names.
pub const PIPELINE_VERSION: &str = "v1.0.0";

/// Static configuration of the pipeline installation.
#[derive(Debug, Clone)]
pub struct SnakemakeConfig {
    /// Launcher: program followed by any fixed leading arguments
    /// (e.g. `["conda", "run", "-n", "trace", "snakemake"]`).
    pub command: Vec<String>,
    /// Directory holding `Snakefile` and `config.yaml`.
    pub pipeline_dir: PathBuf,
    /// Value passed to `--cores`.
    pub cores: u32,
}

impl SnakemakeConfig {
    pub fn new(pipeline_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: vec!["snakemake".to_string()],
            pipeline_dir: pipeline_dir.into(),
            cores: 4,
        }
    }

    /// Directory the pipeline writes its final feature matrices to.
    pub fn results_dir(&self) -> PathBuf {
        self.pipeline_dir.join("results")
    }

    /// Final target file for `sample_id`.
    pub fn output_path(&self, sample_id: &str) -> PathBuf {
        self.results_dir()
            .join(format!("TRACE_{PIPELINE_VERSION}_{sample_id}_feature_matrix.tsv"))
    }
}

/// Runs the TRACE Snakemake workflow for one sample.
#[derive(Debug, Clone)]
pub struct SnakemakeRunner {
    config: SnakemakeConfig,
}

impl SnakemakeRunner {
    pub fn new(config: SnakemakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SnakemakeConfig {
        &self.config
    }

    /// Arguments following the launcher. Depends only on the configuration
    /// and the request, so repeated calls yield identical command lines.
    pub fn build_args(&self, request: &RunRequest) -> Vec<OsString> {
        let dir = &self.config.pipeline_dir;
        let mut samples = OsString::from("samples=");
        samples.push(request.manifest_path.as_os_str());

        vec![
            "--cores".into(),
            self.config.cores.to_string().into(),
            "--snakefile".into(),
            dir.join("Snakefile").into_os_string(),
            "--configfile".into(),
            dir.join("config.yaml").into_os_string(),
            "--config".into(),
            samples,
            "--reason".into(),
            "--keep-going".into(),
            self.config.output_path(&request.sample_id).into_os_string(),
        ]
    }

    fn command(&self, request: &RunRequest) -> Result<tokio::process::Command, RunError> {
        let (program, leading) = self.config.command.split_first().ok_or_else(|| {
            RunError::Spawn {
                program: String::new(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "pipeline command is empty",
                ),
            }
        })?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(leading)
            .args(self.build_args(request))
            .current_dir(working_dir(&self.config.pipeline_dir));
        Ok(cmd)
    }
}

/// Run from the pipeline directory when it exists so relative paths inside
/// the Snakefile resolve; otherwise inherit the worker's directory.
fn working_dir(pipeline_dir: &Path) -> PathBuf {
    if pipeline_dir.is_dir() {
        pipeline_dir.to_path_buf()
    } else {
        PathBuf::from(".")
    }
}

impl PipelineRunner for SnakemakeRunner {
    fn name(&self) -> &str {
        "Snakemake"
    }

    async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError> {
        let mut cmd = self.command(request)?;
        tracing::info!(
            sample_id = %request.sample_id,
            data_type = %request.data_type,
            command = ?cmd.as_std(),
            "Starting pipeline",
        );

        let captured = subprocess::run_command(&mut cmd, request.timeout, cancel).await?;

        tracing::info!(
            sample_id = %request.sample_id,
            exit_code = captured.exit_code,
            duration_ms = captured.duration_ms,
            truncated = captured.truncated,
            "Pipeline exited",
        );

        Ok(RunOutput {
            output_path: self.config.output_path(&request.sample_id),
            stdout: captured.stdout,
            stderr: captured.stderr,
            exit_code: captured.exit_code,
            duration_ms: captured.duration_ms,
            truncated: captured.truncated,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
