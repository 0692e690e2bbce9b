//! Per-worker completion record sent on the result channel.

use serde::{Deserialize, Serialize};

use crate::types::{Effort, WorkerId};

/// Aggregate emitted exactly once by each worker when it sees the stop
/// sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    /// 1-based id in spawn order.
    pub worker_id: WorkerId,
    /// OS-level identity of the executing unit. Diagnostics only.
    pub process_id: u32,
    /// Number of real tasks processed.
    pub task_count: u64,
    /// Sum of the effort values processed.
    pub total_effort: u64,
}

/// Running totals kept by a worker while it drains the task channel.
///
/// Frozen into a [`WorkerSummary`] by [`SummaryBuilder::finish`], which
/// consumes the builder so a summary can only be produced once.
#[derive(Debug)]
pub struct SummaryBuilder {
    worker_id: WorkerId,
    task_count: u64,
    total_effort: u64,
}

impl SummaryBuilder {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            task_count: 0,
            total_effort: 0,
        }
    }

    /// Account for one processed task.
    pub fn record(&mut self, effort: Effort) {
        self.task_count += 1;
        self.total_effort += u64::from(effort);
    }

    pub fn task_count(&self) -> u64 {
        self.task_count
    }

    pub fn finish(self, process_id: u32) -> WorkerSummary {
        WorkerSummary {
            worker_id: self.worker_id,
            process_id,
            task_count: self.task_count,
            total_effort: self.total_effort,
        }
    }
}
