//! Integration tests for a complete dispatcher run: task fan-out, sentinel
//! handshake, summary fan-in and teardown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{instant_dispatcher, PanickingWorkload, RecordingWorkload};
use ventilator_core::config::RunConfig;
use ventilator_core::effort::{FixedEffort, RandomEffort};
use ventilator_core::error::CoreError;
use ventilator_worker::{DispatchError, Dispatcher, EventBus, Milestone, SleepWorkload};

// ---------------------------------------------------------------------------
// Test: fixed scenario from the protocol description
// ---------------------------------------------------------------------------

/// workers=2, tasks=4, capacity=4 with efforts [3,1,4,1]: two summaries,
/// four tasks and nine units of effort in total.
#[tokio::test]
async fn fixed_sequence_two_workers() {
    let mut efforts = FixedEffort::new(vec![3, 1, 4, 1]).unwrap();
    let report = instant_dispatcher(2, 4, 4).run(&mut efforts).await.unwrap();

    assert_eq!(report.summaries.len(), 2);
    assert_eq!(report.total_tasks(), 4);
    assert_eq!(report.total_effort(), 9);
    assert_eq!(report.generated_effort, 9);
    assert!(report.join_failures.is_empty());
}

// ---------------------------------------------------------------------------
// Test: every enqueued task is executed exactly once
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_task_executes_exactly_once() {
    let workload = RecordingWorkload::default();
    let config = RunConfig::from_raw(3, 12, 2).unwrap();
    let dispatcher = Dispatcher::new(config, workload.clone());

    let mut efforts = FixedEffort::new(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 1, 2]).unwrap();
    let report = dispatcher.run(&mut efforts).await.unwrap();

    let mut executed = workload.executed();
    executed.sort_unstable();
    assert_eq!(executed, vec![1, 1, 2, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    assert_eq!(report.total_effort(), 58);
}

// ---------------------------------------------------------------------------
// Test: conservation over several parameter triples
// ---------------------------------------------------------------------------

#[tokio::test]
async fn counts_and_effort_are_conserved() {
    for (workers, tasks, capacity) in [(1, 1, 1), (2, 7, 3), (5, 3, 10), (4, 40, 1)] {
        let dispatcher = instant_dispatcher(workers, tasks, capacity);
        let mut efforts =
            RandomEffort::seeded(dispatcher.config().effort_range(), tasks as u64).unwrap();

        let report = dispatcher.run(&mut efforts).await.unwrap();

        assert_eq!(report.summaries.len(), workers as usize);
        assert_eq!(report.total_tasks(), tasks as u64);
        assert!(
            report.effort_conserved(),
            "effort lost for ({workers}, {tasks}, {capacity})"
        );
    }
}

// ---------------------------------------------------------------------------
// Test: boundaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_worker_consumes_all_tasks() {
    let mut efforts = FixedEffort::new(vec![2, 3]).unwrap();
    let report = instant_dispatcher(1, 5, 2).run(&mut efforts).await.unwrap();

    assert_eq!(report.summaries.len(), 1);
    let summary = &report.summaries[0];
    assert_eq!(summary.worker_id, 1);
    assert_eq!(summary.task_count, 5);
    assert_eq!(summary.total_effort, 12);
}

#[test]
fn zero_tasks_is_a_configuration_error() {
    assert_matches!(
        RunConfig::from_raw(2, 0, 4),
        Err(CoreError::NonPositive { name: "tasks", value: 0 })
    );
}

#[tokio::test]
async fn more_workers_than_tasks_still_reports_every_worker() {
    let mut efforts = FixedEffort::new(vec![5]).unwrap();
    let report = instant_dispatcher(6, 2, 8).run(&mut efforts).await.unwrap();

    assert_eq!(report.summaries.len(), 6);
    assert_eq!(report.total_tasks(), 2);
    assert!(report.summaries.iter().filter(|s| s.task_count == 0).count() >= 4);
}

// ---------------------------------------------------------------------------
// Test: backpressure with a single-slot queue
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn single_slot_queue_completes_with_correct_totals() {
    let config = RunConfig::from_raw(2, 5, 1).unwrap();
    let dispatcher = Dispatcher::new(config, SleepWorkload::new(Duration::from_millis(10)));

    let mut efforts = FixedEffort::new(vec![4, 2, 6, 1, 3]).unwrap();
    let report = dispatcher.run(&mut efforts).await.unwrap();

    assert_eq!(report.summaries.len(), 2);
    assert_eq!(report.total_tasks(), 5);
    assert_eq!(report.total_effort(), 16);
}

// ---------------------------------------------------------------------------
// Test: repeated runs
// ---------------------------------------------------------------------------

/// A second run on the same dispatcher gets fresh channels and behaves
/// identically to the first.
#[tokio::test]
async fn sequential_runs_are_independent() {
    let dispatcher = instant_dispatcher(3, 6, 2);

    for _ in 0..2 {
        let mut efforts = FixedEffort::new(vec![1, 2]).unwrap();
        let report = dispatcher.run(&mut efforts).await.unwrap();
        assert_eq!(report.summaries.len(), 3);
        assert_eq!(report.total_tasks(), 6);
        assert_eq!(report.total_effort(), 9);
    }
}

/// A cancelled run leaves nothing behind that blocks the next one.
#[tokio::test]
async fn run_after_cancelled_run_succeeds() {
    let cancel = tokio_util::sync::CancellationToken::new();
    let config = RunConfig::from_raw(1, 3, 1).unwrap();
    let slow = Dispatcher::new(config, SleepWorkload::new(Duration::from_secs(3600)))
        .with_cancellation(cancel.clone());

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });
    let mut efforts = FixedEffort::new(vec![1]).unwrap();
    assert_matches!(slow.run(&mut efforts).await, Err(DispatchError::Cancelled));
    stopper.await.unwrap();

    let mut efforts = FixedEffort::new(vec![1]).unwrap();
    let report = instant_dispatcher(1, 3, 1).run(&mut efforts).await.unwrap();
    assert_eq!(report.total_tasks(), 3);
}

// ---------------------------------------------------------------------------
// Test: partial failure
// ---------------------------------------------------------------------------

/// A worker that dies mid-task never reports; the run ends with the
/// number of summaries that did arrive instead of hanging.
#[tokio::test]
async fn crashed_worker_surfaces_missing_summary() {
    let config = RunConfig::from_raw(2, 4, 8).unwrap();
    let dispatcher = Dispatcher::new(config, PanickingWorkload { fatal_effort: 9 });

    let mut efforts = FixedEffort::new(vec![9, 1, 1, 1]).unwrap();
    assert_matches!(
        dispatcher.run(&mut efforts).await,
        Err(DispatchError::MissingSummaries {
            received: 1,
            expected: 2
        })
    );
}

/// The crashed worker is still joined: its panic is published as a join
/// failure before the run is reported as failed.
#[tokio::test]
async fn crashed_worker_is_reported_as_join_failure() {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let config = RunConfig::from_raw(2, 4, 8).unwrap();
    let dispatcher = Dispatcher::new(config, PanickingWorkload { fatal_effort: 9 })
        .with_event_bus(Arc::clone(&bus));

    let mut efforts = FixedEffort::new(vec![9, 1, 1, 1]).unwrap();
    assert_matches!(
        dispatcher.run(&mut efforts).await,
        Err(DispatchError::MissingSummaries { .. })
    );

    let mut milestones = Vec::new();
    while let Ok(event) = rx.try_recv() {
        milestones.push(event.milestone);
    }

    let join_failures: Vec<_> = milestones
        .iter()
        .filter_map(|m| match m {
            Milestone::WorkerJoinFailed { worker_id, reason } => Some((*worker_id, reason.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(join_failures.len(), 1, "milestones: {milestones:?}");
    let (worker_id, reason) = &join_failures[0];
    assert!((1..=2).contains(worker_id));
    assert!(reason.contains("panicked"), "unexpected reason: {reason}");

    let summaries: Vec<_> = milestones
        .iter()
        .filter_map(|m| match m {
            Milestone::SummaryReceived { summary } => Some(summary.worker_id),
            _ => None,
        })
        .collect();
    assert_eq!(summaries.len(), 1);
    assert_ne!(summaries[0], *worker_id, "the crashed worker cannot have reported");

    assert_matches!(milestones.last(), Some(Milestone::RunFailed { .. }));
}

// ---------------------------------------------------------------------------
// Test: progress milestones
// ---------------------------------------------------------------------------

#[tokio::test]
async fn milestones_are_published_in_protocol_order() {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let dispatcher = instant_dispatcher(2, 3, 4).with_event_bus(Arc::clone(&bus));

    let mut efforts = FixedEffort::new(vec![2]).unwrap();
    dispatcher.run(&mut efforts).await.unwrap();

    let mut milestones = Vec::new();
    while let Ok(event) = rx.try_recv() {
        milestones.push(event.milestone);
    }

    assert_eq!(
        milestones[..6],
        [
            Milestone::RunStarted {
                workers: 2,
                tasks: 3,
                queue_capacity: 4
            },
            Milestone::WorkerStarted { worker_id: 1 },
            Milestone::WorkerStarted { worker_id: 2 },
            Milestone::DistributingTasks,
            Milestone::TaskQueued { index: 1, effort: 2 },
            Milestone::TaskQueued { index: 2, effort: 2 },
        ]
    );
    assert_eq!(milestones[6], Milestone::TaskQueued { index: 3, effort: 2 });
    assert_eq!(milestones[7], Milestone::SendingSentinels { count: 2 });
    assert_eq!(milestones[8], Milestone::WaitingForWorkers);
    assert_matches!(milestones[9], Milestone::SummaryReceived { .. });
    assert_matches!(milestones[10], Milestone::SummaryReceived { .. });
    assert_eq!(
        milestones[11],
        Milestone::RunCompleted {
            total_tasks: 3,
            total_effort: 6
        }
    );
    assert_eq!(milestones.len(), 12);
}
