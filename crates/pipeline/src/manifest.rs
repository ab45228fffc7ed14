//! Per-job sample manifest.
//!
//! The pipeline reads its sample list from a TSV file. One file is written
//! per job, named from the sample id and the job id, and removed when the
//! [`SampleManifest`] guard is dropped, so it disappears on every exit path
//! of the caller: success, pipeline failure, early `?` return, or panic
//! unwinding.

use std::path::{Path, PathBuf};

use trace_core::error::CoreError;
use trace_core::payload::{validate_sample_id, DataType};
use trace_core::types::DbId;

/// Column header expected by the pipeline's sample sheet parser.
const HEADER: &str = "sample_id\tdata_type\taccession_id\tsource_url";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("invalid manifest field: {0}")]
    Invalid(#[from] CoreError),

    #[error("failed to write sample manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Guard owning an on-disk sample manifest.
#[derive(Debug)]
pub struct SampleManifest {
    path: PathBuf,
}

impl SampleManifest {
    /// Location of the manifest for job `job_id` on `sample_id` inside `dir`.
    ///
    /// Jobs sharing a sample id get distinct files.
    pub fn path_for(dir: &Path, sample_id: &str, job_id: DbId) -> PathBuf {
        dir.join(format!("samples_{sample_id}_{job_id}.tsv"))
    }

    /// Write the manifest and return a guard that removes it on drop.
    ///
    /// A stale file left by a crashed earlier attempt is overwritten. If the
    /// write fails part-way, whatever was created is removed before the
    /// error is returned.
    pub async fn write(
        dir: &Path,
        job_id: DbId,
        sample_id: &str,
        data_type: DataType,
        input_path: &str,
    ) -> Result<Self, ManifestError> {
        validate_sample_id(sample_id)?;
        if input_path.contains(['\t', '\n', '\r']) {
            return Err(ManifestError::Invalid(CoreError::Validation(
                "input_path must not contain tabs or line breaks".to_string(),
            )));
        }

        // Constructed before writing so a partial file is cleaned up too.
        let guard = Self {
            path: Self::path_for(dir, sample_id, job_id),
        };
        let contents = render(sample_id, data_type, input_path);

        if let Err(source) = tokio::fs::write(&guard.path, contents).await {
            return Err(ManifestError::Write {
                path: guard.path.clone(),
                source,
            });
        }

        tracing::debug!(path = %guard.path.display(), "Sample manifest written");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SampleManifest {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Sample manifest removed");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove sample manifest",
                );
            }
        }
    }
}

/// One header row and one sample row. The accession id is the sample id.
fn render(sample_id: &str, data_type: DataType, input_path: &str) -> String {
    format!("{HEADER}\n{sample_id}\t{data_type}\t{sample_id}\t{input_path}\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
