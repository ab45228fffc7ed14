use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use trace_pipeline::SnakemakeConfig;

/// A setting was present but could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Broker behaviour shared by producers and consumers.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// How long a claimed task stays invisible to other workers before it
    /// is redelivered. Renewed while the pipeline runs.
    pub lease: Duration,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(300),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// Worker process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Number of tasks processed in parallel by this process.
    pub concurrency: usize,
    pub queue: QueueConfig,
    /// How long finished task rows stay queryable.
    pub result_retention: Duration,
    pub pipeline: SnakemakeConfig,
    /// Directory for per-job sample manifests.
    pub scratch_dir: PathBuf,
    /// Wall-clock limit per pipeline run; `None` waits indefinitely.
    pub pipeline_timeout: Option<Duration>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default               |
    /// |-------------------------------|-----------------------|
    /// | `DATABASE_URL`                | `sqlite://trace.db`   |
    /// | `WORKER_CONCURRENCY`          | `1`                   |
    /// | `WORKER_POLL_INTERVAL_MS`     | `1000`                |
    /// | `TASK_LEASE_SECS`             | `300`                 |
    /// | `TASK_RESULT_RETENTION_HOURS` | `24`                  |
    /// | `PIPELINE_DIR`                | `/app/pipeline`       |
    /// | `PIPELINE_COMMAND`            | `snakemake`           |
    /// | `PIPELINE_CORES`              | `4`                   |
    /// | `PIPELINE_TIMEOUT_SECS`       | unset (no timeout)    |
    /// | `PIPELINE_SCRATCH_DIR`        | value of `PIPELINE_DIR` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://trace.db".into());

        let concurrency: usize = parse(&lookup, "WORKER_CONCURRENCY", "a positive integer")?
            .unwrap_or(1);
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "WORKER_CONCURRENCY",
                expected: "a positive integer",
                value: "0".into(),
            });
        }

        let poll_ms: u64 = parse(&lookup, "WORKER_POLL_INTERVAL_MS", "milliseconds")?
            .unwrap_or(1000);
        let lease_secs: u64 = parse(&lookup, "TASK_LEASE_SECS", "seconds")?.unwrap_or(300);
        if lease_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "TASK_LEASE_SECS",
                expected: "a positive number of seconds",
                value: "0".into(),
            });
        }
        let retention_hours: u64 =
            parse(&lookup, "TASK_RESULT_RETENTION_HOURS", "hours")?.unwrap_or(24);
        let retention_secs = retention_hours
            .checked_mul(3600)
            .ok_or_else(|| ConfigError::Invalid {
                name: "TASK_RESULT_RETENTION_HOURS",
                expected: "a number of hours that fits in seconds",
                value: retention_hours.to_string(),
            })?;

        let pipeline_dir =
            PathBuf::from(lookup("PIPELINE_DIR").unwrap_or_else(|| "/app/pipeline".into()));

        let raw_command = lookup("PIPELINE_COMMAND").unwrap_or_else(|| "snakemake".into());
        let command: Vec<String> = raw_command.split_whitespace().map(String::from).collect();
        if command.is_empty() {
            return Err(ConfigError::Invalid {
                name: "PIPELINE_COMMAND",
                expected: "a program name",
                value: raw_command,
            });
        }

        let cores: u32 = parse(&lookup, "PIPELINE_CORES", "a positive integer")?.unwrap_or(4);
        let pipeline_timeout = parse::<u64>(&lookup, "PIPELINE_TIMEOUT_SECS", "seconds")?
            .map(Duration::from_secs);
        let scratch_dir = lookup("PIPELINE_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| pipeline_dir.clone());

        Ok(Self {
            database_url,
            concurrency,
            queue: QueueConfig {
                lease: Duration::from_secs(lease_secs),
                poll_interval: Duration::from_millis(poll_ms),
            },
            result_retention: Duration::from_secs(retention_secs),
            pipeline: SnakemakeConfig {
                command,
                pipeline_dir,
                cores,
            },
            scratch_dir,
            pipeline_timeout,
        })
    }
}

/// Parse an optional variable; blank counts as unset.
fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                name,
                expected,
                value,
            }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
