//! Effort generation for dispatched tasks.
//!
//! The dispatcher draws one effort per real task from an [`EffortSource`].
//! Production runs use [`RandomEffort`]; deterministic scenarios replay a
//! [`FixedEffort`] sequence.

use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::validate_effort_range;
use crate::error::CoreError;
use crate::types::Effort;

/// Produces the effort for the next real task. Never yields `0`.
pub trait EffortSource: Send {
    fn next_effort(&mut self) -> Effort;
}

// ---------------------------------------------------------------------------
// RandomEffort
// ---------------------------------------------------------------------------

/// Uniform effort over an inclusive, non-zero range.
#[derive(Debug)]
pub struct RandomEffort {
    range: RangeInclusive<Effort>,
    rng: StdRng,
}

impl RandomEffort {
    /// Seeded from the operating system.
    pub fn new(range: RangeInclusive<Effort>) -> Result<Self, CoreError> {
        validate_effort_range(*range.start(), *range.end())?;
        Ok(Self {
            range,
            rng: StdRng::from_os_rng(),
        })
    }

    /// Reproducible sequence for a given seed.
    pub fn seeded(range: RangeInclusive<Effort>, seed: u64) -> Result<Self, CoreError> {
        validate_effort_range(*range.start(), *range.end())?;
        Ok(Self {
            range,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl EffortSource for RandomEffort {
    fn next_effort(&mut self) -> Effort {
        self.rng.random_range(self.range.clone())
    }
}

// ---------------------------------------------------------------------------
// FixedEffort
// ---------------------------------------------------------------------------

/// Replays a fixed sequence, wrapping around when exhausted.
#[derive(Debug, Clone)]
pub struct FixedEffort {
    values: Vec<Effort>,
    cursor: usize,
}

impl FixedEffort {
    pub fn new(values: Vec<Effort>) -> Result<Self, CoreError> {
        if values.is_empty() {
            return Err(CoreError::Validation(
                "Fixed effort sequence must not be empty".to_string(),
            ));
        }
        if let Some(i) = values.iter().position(|&e| e == 0) {
            return Err(CoreError::Validation(format!(
                "Fixed effort at index {i} is 0 (reserved for the stop sentinel)"
            )));
        }
        Ok(Self { values, cursor: 0 })
    }
}

impl EffortSource for FixedEffort {
    fn next_effort(&mut self) -> Effort {
        let effort = self.values[self.cursor];
        self.cursor = (self.cursor + 1) % self.values.len();
        effort
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
