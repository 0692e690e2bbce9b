//! The ventilator: fan tasks out to a pool of workers and fan their
//! summaries back in.
//!
//! A run goes through five phases:
//!
//! 1. Create the task and result channels ([`ChannelPair`]).
//! 2. Spawn `workers` [`Worker`]s with ids `1..=workers`.
//! 3. Enqueue `tasks` real tasks, then one stop sentinel per worker.
//! 4. Read exactly `workers` summaries, in arrival order.
//! 5. Join every worker and destroy both channels.
//!
//! Sentinels are not addressed to a particular worker. Every worker leaves
//! its loop on the first sentinel it dequeues and all sentinels sit behind
//! all real tasks, so `workers` sentinels reach `workers` distinct workers.
//!
//! There are no timeouts. If a worker dies without reporting, the run ends
//! with [`DispatchError::MissingSummaries`] once every other worker has
//! finished; if the task channel is full and nobody is left to drain it,
//! only cancellation ends the run.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ventilator_core::config::RunConfig;
use ventilator_core::effort::EffortSource;
use ventilator_core::error::CoreError;
use ventilator_core::summary::WorkerSummary;
use ventilator_core::task::TaskDescriptor;
use ventilator_core::types::WorkerId;

use crate::bus::{EventBus, Milestone};
use crate::channel::{ChannelError, ChannelPair, ChannelReceiver, ChannelSender};
use crate::worker::{Worker, WorkerError};
use crate::workload::Workload;

type WorkerHandle = (WorkerId, JoinHandle<Result<WorkerSummary, WorkerError>>);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A run parameter is invalid. Nothing was created.
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] CoreError),

    /// A channel or a worker could not be created.
    #[error("Failed to create {resource}: {reason}")]
    ResourceCreation {
        resource: &'static str,
        reason: String,
    },

    /// A send or receive failed while the run was in progress.
    #[error("Delivery failed while trying to {stage}: {source}")]
    Delivery {
        stage: &'static str,
        #[source]
        source: ChannelError,
    },

    /// Every worker is gone but some summaries never arrived.
    #[error("Result channel closed after {received} of {expected} summaries")]
    MissingSummaries { received: usize, expected: usize },

    /// The run's cancellation token fired.
    #[error("Run cancelled")]
    Cancelled,
}

/// A worker that could not be joined cleanly. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Worker {worker_id} did not terminate cleanly: {reason}")]
pub struct ChildTerminationError {
    pub worker_id: WorkerId,
    pub reason: String,
}

fn delivery(stage: &'static str) -> impl FnOnce(ChannelError) -> DispatchError {
    move |source| match source {
        ChannelError::Cancelled { .. } => DispatchError::Cancelled,
        source => DispatchError::Delivery { stage, source },
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One summary per worker, in the order they arrived.
    pub summaries: Vec<WorkerSummary>,
    /// Sum of the effort of every task that was enqueued.
    pub generated_effort: u64,
    /// Workers that reported but then failed to join.
    pub join_failures: Vec<ChildTerminationError>,
}

impl RunReport {
    pub fn total_tasks(&self) -> u64 {
        self.summaries.iter().map(|s| s.task_count).sum()
    }

    pub fn total_effort(&self) -> u64 {
        self.summaries.iter().map(|s| s.total_effort).sum()
    }

    /// Whether the workers accounted for exactly the effort that was sent.
    pub fn effort_conserved(&self) -> bool {
        self.total_effort() == self.generated_effort
    }

    /// One human-readable line per worker, in arrival order. `unit` is the
    /// wall-clock duration of one effort unit.
    pub fn summary_lines(&self, unit: Duration) -> Vec<String> {
        self.summaries
            .iter()
            .map(|s| {
                let seconds = unit.as_secs_f64() * s.total_effort as f64;
                format!(
                    "Worker {} processed {} tasks in {} seconds",
                    s.worker_id, s.task_count, seconds
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher<W: Workload> {
    config: RunConfig,
    workload: Arc<W>,
    bus: Option<Arc<EventBus>>,
    cancel: CancellationToken,
}

impl<W: Workload> Dispatcher<W> {
    pub fn new(config: RunConfig, workload: W) -> Self {
        Self {
            config,
            workload: Arc::new(workload),
            bus: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Publish progress milestones on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Stop the run when `cancel` fires. Each run derives a child token,
    /// so cancelling one failed run never leaks into the next.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute one complete run, drawing task efforts from `efforts`.
    ///
    /// Channels are destroyed before this returns, on every path.
    pub async fn run(&self, efforts: &mut dyn EffortSource) -> Result<RunReport, DispatchError> {
        let result = self.execute(efforts).await;

        match &result {
            Ok(report) => {
                tracing::info!(
                    workers = report.summaries.len(),
                    total_tasks = report.total_tasks(),
                    total_effort = report.total_effort(),
                    "All workers reported",
                );
                self.publish(Milestone::RunCompleted {
                    total_tasks: report.total_tasks(),
                    total_effort: report.total_effort(),
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Run failed");
                self.publish(Milestone::RunFailed {
                    reason: e.to_string(),
                });
            }
        }

        result
    }

    async fn execute(&self, efforts: &mut dyn EffortSource) -> Result<RunReport, DispatchError> {
        self.config.validate()?;
        let config = &self.config;

        let pair = ChannelPair::create(config.queue_capacity).map_err(|e| {
            DispatchError::ResourceCreation {
                resource: "channels",
                reason: e.to_string(),
            }
        })?;
        let (task_tx, task_rx, result_tx, result_rx, channels) = pair.split();

        tracing::info!(
            workers = config.workers,
            tasks = config.tasks,
            queue_capacity = config.queue_capacity,
            "Starting workers",
        );
        self.publish(Milestone::RunStarted {
            workers: config.workers,
            tasks: config.tasks,
            queue_capacity: config.queue_capacity,
        });

        let cancel = self.cancel.child_token();

        // Workers hold the only task receivers and result senders from here
        // on, so a closed result channel means every worker has exited.
        let spawned = self.spawn_workers(&task_rx, &result_tx, &cancel);
        drop(task_rx);
        drop(result_tx);
        let handles = match spawned {
            Ok(handles) => handles,
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        };

        let collected = self
            .distribute_and_collect(efforts, &task_tx, &result_rx, &cancel)
            .await;
        if collected.is_err() {
            cancel.cancel();
        }

        let join_failures = self.join_workers(handles).await;
        channels.destroy();

        let (summaries, generated_effort) = collected?;
        Ok(RunReport {
            summaries,
            generated_effort,
            join_failures,
        })
    }

    /// Spawn one worker per configured slot, ids starting at 1.
    ///
    /// Any failure aborts the run; workers already spawned are stopped by
    /// the caller through `cancel`.
    fn spawn_workers(
        &self,
        task_rx: &ChannelReceiver<TaskDescriptor>,
        result_tx: &ChannelSender<WorkerSummary>,
        cancel: &CancellationToken,
    ) -> Result<Vec<WorkerHandle>, DispatchError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| DispatchError::ResourceCreation {
                resource: "worker",
                reason: e.to_string(),
            })?;

        let mut handles = Vec::with_capacity(self.config.workers as usize);
        for worker_id in 1..=self.config.workers {
            let worker = Worker::new(
                worker_id,
                task_rx.clone(),
                result_tx.clone(),
                Arc::clone(&self.workload),
                cancel.clone(),
            );
            handles.push((worker_id, runtime.spawn(worker.run())));

            tracing::info!(worker_id, "Started worker");
            self.publish(Milestone::WorkerStarted { worker_id });
        }

        Ok(handles)
    }

    /// Enqueue every task and sentinel, then gather one summary per worker.
    async fn distribute_and_collect(
        &self,
        efforts: &mut dyn EffortSource,
        task_tx: &ChannelSender<TaskDescriptor>,
        result_rx: &ChannelReceiver<WorkerSummary>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<WorkerSummary>, u64), DispatchError> {
        let workers = self.config.workers;

        tracing::info!("Distributing tasks");
        self.publish(Milestone::DistributingTasks);

        let mut generated_effort = 0u64;
        for index in 1..=self.config.tasks {
            let effort = efforts.next_effort();
            let task = TaskDescriptor::task(effort)?;

            task_tx
                .send(task, cancel)
                .await
                .map_err(delivery("enqueue a task"))?;
            generated_effort += u64::from(effort);

            tracing::info!(task = index, effort, queued = task_tx.queued(), "Queued task");
            self.publish(Milestone::TaskQueued { index, effort });
        }

        tracing::info!(count = workers, "Sending termination tasks");
        self.publish(Milestone::SendingSentinels { count: workers });
        for _ in 0..workers {
            task_tx
                .send(TaskDescriptor::Stop, cancel)
                .await
                .map_err(delivery("enqueue a stop sentinel"))?;
        }

        tracing::info!("Waiting for workers to terminate");
        self.publish(Milestone::WaitingForWorkers);

        let expected = workers as usize;
        let mut summaries = Vec::with_capacity(expected);
        while summaries.len() < expected {
            let summary = match result_rx.recv(cancel).await {
                Ok(summary) => summary,
                Err(ChannelError::Closed { .. }) => {
                    return Err(DispatchError::MissingSummaries {
                        received: summaries.len(),
                        expected,
                    });
                }
                Err(e) => return Err(delivery("collect a summary")(e)),
            };

            tracing::info!(
                worker_id = summary.worker_id,
                process_id = summary.process_id,
                task_count = summary.task_count,
                total_effort = summary.total_effort,
                "Worker {} processed {} tasks with total effort {}",
                summary.worker_id,
                summary.task_count,
                summary.total_effort,
            );
            self.publish(Milestone::SummaryReceived {
                summary: summary.clone(),
            });
            summaries.push(summary);
        }

        Ok((summaries, generated_effort))
    }

    /// Wait for every worker to exit. Failures are logged and returned,
    /// never propagated.
    async fn join_workers(&self, handles: Vec<WorkerHandle>) -> Vec<ChildTerminationError> {
        let mut failures = Vec::new();

        for (worker_id, handle) in handles {
            let reason = match handle.await {
                Ok(Ok(_)) => {
                    tracing::debug!(worker_id, "Joined worker");
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };

            tracing::warn!(worker_id, reason = %reason, "Worker did not terminate cleanly");
            self.publish(Milestone::WorkerJoinFailed {
                worker_id,
                reason: reason.clone(),
            });
            failures.push(ChildTerminationError { worker_id, reason });
        }

        failures
    }

    fn publish(&self, milestone: Milestone) {
        if let Some(bus) = &self.bus {
            bus.publish(milestone);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use ventilator_core::effort::FixedEffort;

    use super::*;
    use crate::workload::SleepWorkload;

    fn dispatcher(workers: i64, tasks: i64, capacity: i64) -> Dispatcher<SleepWorkload> {
        let config = RunConfig::from_raw(workers, tasks, capacity).unwrap();
        Dispatcher::new(config, SleepWorkload::new(Duration::ZERO))
    }

    #[tokio::test]
    async fn report_accounts_for_every_task() {
        let mut efforts = FixedEffort::new(vec![2, 7, 1]).unwrap();
        let report = dispatcher(3, 9, 2).run(&mut efforts).await.unwrap();

        assert_eq!(report.summaries.len(), 3);
        assert_eq!(report.total_tasks(), 9);
        assert_eq!(report.generated_effort, 30);
        assert!(report.effort_conserved());
        assert!(report.join_failures.is_empty());
    }

    #[tokio::test]
    async fn every_worker_id_reports_once() {
        let mut efforts = FixedEffort::new(vec![1]).unwrap();
        let report = dispatcher(4, 10, 3).run(&mut efforts).await.unwrap();

        let mut ids: Vec<_> = report.summaries.iter().map(|s| s.worker_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_anything_starts() {
        let config = RunConfig {
            workers: 1,
            tasks: 0,
            queue_capacity: 1,
            effort_min: 1,
            effort_max: 10,
        };
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let dispatcher =
            Dispatcher::new(config, SleepWorkload::new(Duration::ZERO)).with_event_bus(bus);

        let mut efforts = FixedEffort::new(vec![1]).unwrap();
        assert_matches!(
            dispatcher.run(&mut efforts).await,
            Err(DispatchError::Configuration(CoreError::NonPositive { name: "tasks", .. }))
        );

        let event = rx.recv().await.unwrap();
        assert_matches!(event.milestone, Milestone::RunFailed { .. });
    }

    #[tokio::test]
    async fn oversized_queue_is_a_resource_error() {
        let mut config = RunConfig::from_raw(1, 1, 1).unwrap();
        config.queue_capacity = crate::channel::MAX_QUEUE_CAPACITY + 1;
        let dispatcher = Dispatcher::new(config, SleepWorkload::new(Duration::ZERO));

        let mut efforts = FixedEffort::new(vec![1]).unwrap();
        assert_matches!(
            dispatcher.run(&mut efforts).await,
            Err(DispatchError::ResourceCreation { resource: "channels", .. })
        );
    }

    #[tokio::test]
    async fn cancellation_stops_a_blocked_run() {
        let cancel = CancellationToken::new();
        let config = RunConfig::from_raw(1, 3, 1).unwrap();
        let dispatcher = Dispatcher::new(config, SleepWorkload::new(Duration::from_secs(3600)))
            .with_cancellation(cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let mut efforts = FixedEffort::new(vec![1]).unwrap();
        assert_matches!(
            dispatcher.run(&mut efforts).await,
            Err(DispatchError::Cancelled)
        );
        canceller.await.unwrap();
    }

    #[test]
    fn summary_lines_report_seconds_per_worker() {
        let summary = |worker_id, task_count, total_effort| WorkerSummary {
            worker_id,
            process_id: 1,
            task_count,
            total_effort,
        };
        let report = RunReport {
            summaries: vec![summary(2, 3, 9), summary(1, 1, 3)],
            generated_effort: 12,
            join_failures: Vec::new(),
        };

        assert_eq!(
            report.summary_lines(Duration::from_secs(1)),
            vec![
                "Worker 2 processed 3 tasks in 9 seconds",
                "Worker 1 processed 1 tasks in 3 seconds",
            ]
        );
        assert_eq!(
            report.summary_lines(Duration::from_millis(500))[1],
            "Worker 1 processed 1 tasks in 1.5 seconds"
        );
    }

    #[test]
    fn cancelled_channel_error_maps_to_cancelled() {
        let err = delivery("enqueue a task")(ChannelError::Cancelled { channel: "q" });
        assert_matches!(err, DispatchError::Cancelled);

        let err = delivery("enqueue a task")(ChannelError::Closed { channel: "q" });
        assert_matches!(
            err,
            DispatchError::Delivery {
                stage: "enqueue a task",
                ..
            }
        );
    }
}
