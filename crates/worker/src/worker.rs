//! A single worker: drain the task channel until the stop sentinel, then
//! report one summary.
//!
//! Lifecycle: `Running` while pulling and executing tasks, `Finalizing`
//! once the sentinel is seen and the summary is being sent, `Terminated`
//! after that. There are no retries; a task whose execution is cut short by
//! cancellation is simply lost.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use ventilator_core::summary::{SummaryBuilder, WorkerSummary};
use ventilator_core::task::TaskDescriptor;
use ventilator_core::types::WorkerId;

use crate::channel::{ChannelError, ChannelReceiver, ChannelSender};
use crate::workload::{Workload, WorkloadError};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Finalizing,
    Terminated,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Receiving a task or sending the summary failed.
    #[error("Worker {worker_id} delivery failed: {source}")]
    Delivery {
        worker_id: WorkerId,
        #[source]
        source: ChannelError,
    },

    /// The run was cancelled mid-task.
    #[error("Worker {worker_id} cancelled: {source}")]
    Cancelled {
        worker_id: WorkerId,
        #[source]
        source: WorkloadError,
    },
}

/// Everything a worker owns: its id, its two channel handles, the workload
/// and the run's cancellation token.
pub struct Worker<W: Workload> {
    id: WorkerId,
    tasks: ChannelReceiver<TaskDescriptor>,
    results: ChannelSender<WorkerSummary>,
    workload: Arc<W>,
    cancel: CancellationToken,
    state: WorkerState,
}

impl<W: Workload> Worker<W> {
    pub fn new(
        id: WorkerId,
        tasks: ChannelReceiver<TaskDescriptor>,
        results: ChannelSender<WorkerSummary>,
        workload: Arc<W>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            tasks,
            results,
            workload,
            cancel,
            state: WorkerState::Running,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run the receive-process loop to completion.
    ///
    /// Returns the summary that was sent on the result channel. On any
    /// error the worker terminates without sending a summary.
    pub async fn run(mut self) -> Result<WorkerSummary, WorkerError> {
        let result = self.drain_and_report().await;
        self.transition(WorkerState::Terminated);

        match &result {
            Ok(summary) => tracing::debug!(
                worker_id = self.id,
                task_count = summary.task_count,
                "Worker terminated",
            ),
            Err(e) => tracing::error!(worker_id = self.id, error = %e, "Worker terminated early"),
        }

        result
    }

    async fn drain_and_report(&mut self) -> Result<WorkerSummary, WorkerError> {
        let mut totals = SummaryBuilder::new(self.id);

        loop {
            let task = self
                .tasks
                .recv(&self.cancel)
                .await
                .map_err(|source| WorkerError::Delivery {
                    worker_id: self.id,
                    source,
                })?;

            let effort = match task {
                TaskDescriptor::Stop => break,
                TaskDescriptor::Task { effort } => effort,
            };

            totals.record(effort);
            tracing::info!(worker_id = self.id, effort, "Received task");

            self.workload
                .execute(effort, &self.cancel)
                .await
                .map_err(|source| WorkerError::Cancelled {
                    worker_id: self.id,
                    source,
                })?;
        }

        self.transition(WorkerState::Finalizing);

        let summary = totals.finish(std::process::id());
        self.results
            .send(summary.clone(), &self.cancel)
            .await
            .map_err(|source| WorkerError::Delivery {
                worker_id: self.id,
                source,
            })?;

        Ok(summary)
    }

    fn transition(&mut self, next: WorkerState) {
        tracing::trace!(worker_id = self.id, from = ?self.state, to = ?next, "Worker state change");
        self.state = next;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
