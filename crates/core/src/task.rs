//! Task descriptors carried on the task channel.
//!
//! On the wire a descriptor is a single effort value where `0` means
//! "stop". In Rust the sentinel is its own variant so a worker can never
//! mistake it for a zero-cost task.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Effort;

/// Effort value reserved for the stop sentinel.
pub const STOP_EFFORT: Effort = 0;

/// One message on the task channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskDescriptor {
    /// A real unit of work with a non-zero effort.
    Task { effort: Effort },
    /// Tells the receiving worker to leave its loop and report.
    Stop,
}

impl TaskDescriptor {
    /// Build a real task. Rejects the reserved sentinel value.
    pub fn task(effort: Effort) -> Result<Self, CoreError> {
        if effort == STOP_EFFORT {
            return Err(CoreError::Validation(
                "Effort 0 is reserved for the stop sentinel".to_string(),
            ));
        }
        Ok(Self::Task { effort })
    }

    /// Decode a raw effort value, mapping `0` to [`TaskDescriptor::Stop`].
    pub fn from_effort(effort: Effort) -> Self {
        if effort == STOP_EFFORT {
            Self::Stop
        } else {
            Self::Task { effort }
        }
    }

    /// Raw effort value; `0` for the sentinel.
    pub fn effort(&self) -> Effort {
        match self {
            Self::Task { effort } => *effort,
            Self::Stop => STOP_EFFORT,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
