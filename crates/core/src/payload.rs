//! Versioned task payload exchanged between the submitter and workers.
//!
//! The payload is a flat descriptor with no mutable state. It is validated
//! at the queue boundary by [`TaskPayload::decode`] so that malformed
//! entries are rejected before a worker ever touches the job store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Current payload schema version written by [`TaskPayload::new`].
pub const PAYLOAD_VERSION: u32 = 1;

/// Maximum length of a sample identifier.
const MAX_SAMPLE_ID_LEN: usize = 128;

/// Maximum length of an input path.
const MAX_INPUT_PATH_LEN: usize = 4096;

// ---------------------------------------------------------------------------
// DataType
// ---------------------------------------------------------------------------

/// Sequencing assay of the submitted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Whole-genome sequencing.
    #[serde(rename = "WGS")]
    Wgs,
    /// Whole-genome bisulfite sequencing.
    #[serde(rename = "WGBS")]
    Wgbs,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Wgs => "WGS",
            DataType::Wgbs => "WGBS",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WGS" => Ok(DataType::Wgs),
            "WGBS" => Ok(DataType::Wgbs),
            other => Err(CoreError::Validation(format!(
                "data_type must be WGS or WGBS, got {other:?}"
            ))),
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// TaskPayload
// ---------------------------------------------------------------------------

/// Why a raw queue entry could not be turned into a [`TaskPayload`].
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload does not match the task schema: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported payload version {found} (expected {})", PAYLOAD_VERSION)]
    UnsupportedVersion { found: u32 },

    #[error("invalid payload field: {0}")]
    Invalid(#[from] CoreError),
}

/// Work descriptor carried by a queue task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPayload {
    pub version: u32,
    pub job_id: DbId,
    pub input_path: String,
    pub sample_id: String,
    pub data_type: DataType,
}

impl TaskPayload {
    /// Build a payload at the current schema version.
    pub fn new(
        job_id: DbId,
        input_path: impl Into<String>,
        sample_id: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            job_id,
            input_path: input_path.into(),
            sample_id: sample_id.into(),
            data_type,
        }
    }

    /// Parse and validate a raw payload taken off the queue.
    pub fn decode(raw: &str) -> Result<Self, PayloadError> {
        let payload: TaskPayload = serde_json::from_str(raw)?;
        if payload.version != PAYLOAD_VERSION {
            return Err(PayloadError::UnsupportedVersion {
                found: payload.version,
            });
        }
        payload.validate()?;
        Ok(payload)
    }

    /// Serialize for storage in the queue.
    pub fn encode(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check field-level rules shared by submission and decoding.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.job_id <= 0 {
            return Err(CoreError::Validation(format!(
                "job_id must be positive, got {}",
                self.job_id
            )));
        }
        validate_sample_id(&self.sample_id)?;
        validate_input_path(&self.input_path)
    }
}

/// Validate a sample identifier.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_SAMPLE_ID_LEN` characters.
/// - Only ASCII alphanumeric, hyphen, underscore, or dot characters, and not
///   `.` or `..` (the id is used to name the per-job manifest file).
pub fn validate_sample_id(sample_id: &str) -> Result<(), CoreError> {
    if sample_id.is_empty() {
        return Err(CoreError::Validation(
            "sample_id must not be empty".to_string(),
        ));
    }
    if sample_id.len() > MAX_SAMPLE_ID_LEN {
        return Err(CoreError::Validation(format!(
            "sample_id must not exceed {MAX_SAMPLE_ID_LEN} characters"
        )));
    }
    if sample_id == "." || sample_id == ".." {
        return Err(CoreError::Validation(
            "sample_id must not be a relative path component".to_string(),
        ));
    }
    if !sample_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(
            "sample_id may only contain alphanumeric, hyphen, underscore, or dot characters"
                .to_string(),
        ));
    }
    Ok(())
}

/// Validate an input file path: non-empty, bounded, no control characters.
pub fn validate_input_path(input_path: &str) -> Result<(), CoreError> {
    if input_path.trim().is_empty() {
        return Err(CoreError::Validation(
            "input_path must not be empty".to_string(),
        ));
    }
    if input_path.len() > MAX_INPUT_PATH_LEN {
        return Err(CoreError::Validation(format!(
            "input_path must not exceed {MAX_INPUT_PATH_LEN} characters"
        )));
    }
    if input_path.chars().any(char::is_control) {
        return Err(CoreError::Validation(
            "input_path must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
