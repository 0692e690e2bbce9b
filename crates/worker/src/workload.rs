//! The unit of work a worker performs for each task.
//!
//! Effort is opaque to the dispatch protocol; a [`Workload`] turns it into
//! actual time spent. The default [`SleepWorkload`] simply suspends the
//! worker for `effort * unit`.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use ventilator_core::types::Effort;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkloadError {
    #[error("Workload cancelled after {elapsed_ms} ms")]
    Cancelled { elapsed_ms: u64 },
}

/// Executes one task of the given effort.
///
/// Implementations block the calling worker for the duration of the task
/// and must return promptly once `cancel` fires.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    async fn execute(&self, effort: Effort, cancel: &CancellationToken)
        -> Result<(), WorkloadError>;
}

/// Simulates work by sleeping for `effort` units of time.
#[derive(Debug, Clone, Copy)]
pub struct SleepWorkload {
    unit: Duration,
}

impl SleepWorkload {
    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }

    /// Wall-clock duration of a task with the given effort.
    pub fn duration_for(&self, effort: Effort) -> Duration {
        self.unit.saturating_mul(effort)
    }
}

#[async_trait]
impl Workload for SleepWorkload {
    async fn execute(
        &self,
        effort: Effort,
        cancel: &CancellationToken,
    ) -> Result<(), WorkloadError> {
        let start = tokio::time::Instant::now();
        tokio::select! {
            _ = cancel.cancelled() => Err(WorkloadError::Cancelled {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
            _ = tokio::time::sleep(self.duration_for(effort)) => Ok(()),
        }
    }
}
