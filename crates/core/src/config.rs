//! Run parameters and their validation.
//!
//! Pure functions and constants shared by the dispatcher and the binary.
//! Validation happens before anything is created, so a rejected config has
//! no side effects.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Effort;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest effort a generated task may carry.
pub const DEFAULT_EFFORT_MIN: Effort = 1;

/// Largest effort a generated task may carry.
pub const DEFAULT_EFFORT_MAX: Effort = 10;

/// Wall-clock cost of one unit of effort, in milliseconds.
pub const DEFAULT_EFFORT_UNIT_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Validated parameters for a single dispatcher run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of concurrent workers to spawn.
    pub workers: u32,
    /// Number of real tasks to generate.
    pub tasks: u32,
    /// Bound shared by the task and result channels.
    pub queue_capacity: usize,
    /// Inclusive lower bound for generated effort.
    pub effort_min: Effort,
    /// Inclusive upper bound for generated effort.
    pub effort_max: Effort,
}

impl RunConfig {
    /// Build a config from raw, possibly non-positive, inputs.
    ///
    /// Parameters are checked in the order `workers`, `tasks`,
    /// `queue_capacity`; the first offender is reported.
    pub fn from_raw(workers: i64, tasks: i64, queue_capacity: i64) -> Result<Self, CoreError> {
        let config = Self {
            workers: positive("workers", workers)?,
            tasks: positive("tasks", tasks)?,
            queue_capacity: positive("queue_capacity", queue_capacity)? as usize,
            effort_min: DEFAULT_EFFORT_MIN,
            effort_max: DEFAULT_EFFORT_MAX,
        };
        config.validate()?;
        Ok(config)
    }

    /// Override the effort range used for generated tasks.
    pub fn with_effort_range(mut self, min: Effort, max: Effort) -> Self {
        self.effort_min = min;
        self.effort_max = max;
        self
    }

    pub fn effort_range(&self) -> RangeInclusive<Effort> {
        self.effort_min..=self.effort_max
    }

    /// Check every invariant of a config, however it was constructed.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.workers == 0 {
            return Err(CoreError::NonPositive { name: "workers", value: 0 });
        }
        if self.tasks == 0 {
            return Err(CoreError::NonPositive { name: "tasks", value: 0 });
        }
        if self.queue_capacity == 0 {
            return Err(CoreError::NonPositive {
                name: "queue_capacity",
                value: 0,
            });
        }
        validate_effort_range(self.effort_min, self.effort_max)
    }
}

/// Validate an inclusive effort range.
///
/// Rules:
/// - The lower bound must be non-zero (zero is the stop sentinel).
/// - The lower bound must not exceed the upper bound.
pub fn validate_effort_range(min: Effort, max: Effort) -> Result<(), CoreError> {
    if min == 0 {
        return Err(CoreError::Validation(
            "Effort range must not include 0 (reserved for the stop sentinel)".to_string(),
        ));
    }
    if min > max {
        return Err(CoreError::Validation(format!(
            "Effort range is empty: {min} > {max}"
        )));
    }
    Ok(())
}

fn positive(name: &'static str, value: i64) -> Result<u32, CoreError> {
    if value <= 0 {
        return Err(CoreError::NonPositive { name, value });
    }
    u32::try_from(value).map_err(|_| {
        CoreError::Validation(format!("Parameter `{name}` is too large: {value}"))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
