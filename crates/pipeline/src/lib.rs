//! Pipeline runner adapter.
//!
//! Wraps invocation of the external analysis pipeline (Snakemake) as a child
//! process: deterministic argument construction, concurrent capped capture of
//! both output streams, optional timeout, cooperative cancellation, and the
//! per-job sample manifest the pipeline reads. Holds no persistent state and
//! has no database access.

pub mod executor;
pub mod manifest;
pub mod snakemake;
pub mod subprocess;

pub use executor::{PipelineRunner, RunError, RunOutput, RunRequest};
pub use manifest::{ManifestError, SampleManifest};
pub use snakemake::{SnakemakeConfig, SnakemakeRunner};
