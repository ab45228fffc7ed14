//! Lifecycle status enums for jobs and queue tasks.
//!
//! Both enums persist as TEXT columns. Job statuses use the lowercase domain
//! vocabulary shown to callers; task statuses use the uppercase bookkeeping
//! vocabulary of the queue. The two are intentionally different strings but
//! must always agree on whether work is finished (see [`TaskStatus::for_job`]).

use std::fmt;
use std::str::FromStr;

/// Returned when a persisted or wire status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} status: {value:?}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident = $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in lifecycle order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The persisted / wire representation.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownStatus;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

define_status_enum! {
    /// Domain lifecycle of a job: `pending → running → {complete, failed}`.
    JobStatus ("job") {
        Pending = "pending",
        Running = "running",
        Complete = "complete",
        Failed = "failed",
    }
}

define_status_enum! {
    /// Delivery bookkeeping of a queue task.
    TaskStatus ("task") {
        /// Enqueued, waiting for a worker.
        Pending = "PENDING",
        /// Claimed by a worker (may be redelivered once its lease expires).
        Started = "STARTED",
        Success = "SUCCESS",
        Failure = "FAILURE",
    }
}

impl JobStatus {
    /// `complete` and `failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `running → running` is allowed so a redelivered task can re-enter the
    /// machine. `pending → failed` covers faults before the running write
    /// lands. Nothing ever leaves a terminal state.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Running)
                | (Pending, Failed)
                | (Running, Complete)
                | (Running, Failed)
        )
    }

    /// All statuses from which `next` may be reached.
    pub fn predecessors(next: JobStatus) -> Vec<JobStatus> {
        JobStatus::ALL
            .iter()
            .copied()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }
}

impl TaskStatus {
    /// `SUCCESS` and `FAILURE` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    /// The task status that accompanies a terminal job status.
    ///
    /// Returns `None` for non-terminal job statuses; those never finish a task.
    pub fn for_job(status: JobStatus) -> Option<TaskStatus> {
        match status {
            JobStatus::Complete => Some(TaskStatus::Success),
            JobStatus::Failed => Some(TaskStatus::Failure),
            JobStatus::Pending | JobStatus::Running => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
