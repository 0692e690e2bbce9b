//! In-process progress bus backed by a `tokio::sync::broadcast` channel.
//!
//! The dispatcher publishes a [`DispatchEvent`] at every milestone of a run
//! so callers can observe progress without parsing log lines. It is
//! designed to be shared via `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use ventilator_core::summary::WorkerSummary;
use ventilator_core::types::{Effort, WorkerId};

// ---------------------------------------------------------------------------
// DispatchEvent
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Milestone {
    RunStarted {
        workers: u32,
        tasks: u32,
        queue_capacity: usize,
    },
    WorkerStarted {
        worker_id: WorkerId,
    },
    DistributingTasks,
    TaskQueued {
        /// 1-based position in enqueue order.
        index: u32,
        effort: Effort,
    },
    SendingSentinels {
        count: u32,
    },
    WaitingForWorkers,
    SummaryReceived {
        summary: WorkerSummary,
    },
    WorkerJoinFailed {
        worker_id: WorkerId,
        reason: String,
    },
    RunCompleted {
        total_tasks: u64,
        total_effort: u64,
    },
    RunFailed {
        reason: String,
    },
}

/// A milestone stamped with the time it was published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub milestone: Milestone,
    pub timestamp: DateTime<Utc>,
}

impl DispatchEvent {
    pub fn new(milestone: Milestone) -> Self {
        Self {
            milestone,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out progress bus.
///
/// # Usage
///
/// ```rust
/// use ventilator_worker::bus::{EventBus, Milestone};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(Milestone::WaitingForWorkers);
/// ```
pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow subscribers lose the oldest events and observe
    /// `RecvError::Lagged`; the dispatcher is never held up by them.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a milestone to all current subscribers.
    pub fn publish(&self, milestone: Milestone) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(DispatchEvent::new(milestone));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
