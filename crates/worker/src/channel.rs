//! Bounded FIFO channels shared by the dispatcher and its workers.
//!
//! Built on [`tokio::sync::mpsc`]. The receiving half is wrapped in an
//! `Arc<Mutex<_>>` so any number of workers can pull from one queue: the
//! tokio mutex hands out the lock in FIFO order, and whoever holds it takes
//! the next message. Every blocking operation races an explicit
//! [`CancellationToken`].
//!
//! A channel is *destroyed* by cancelling its identity token. After that,
//! sends and receives on any handle fail with [`ChannelError::Closed`],
//! including ones already blocked.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use ventilator_core::summary::WorkerSummary;
use ventilator_core::task::TaskDescriptor;

/// Name of the channel carrying task descriptors.
pub const TASK_CHANNEL: &str = "task_queue";

/// Name of the channel carrying worker summaries.
pub const RESULT_CHANNEL: &str = "result_queue";

/// Upper bound on the capacity of a single channel.
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The requested capacity cannot be allocated.
    #[error(
        "Cannot create channel {channel} with capacity {capacity} (allowed 1..={max})",
        max = MAX_QUEUE_CAPACITY
    )]
    InvalidCapacity {
        channel: &'static str,
        capacity: usize,
    },

    /// The channel was destroyed, or every handle on the other side is gone.
    #[error("Channel {channel} is closed")]
    Closed { channel: &'static str },

    /// The caller's cancellation token fired while blocked.
    #[error("Operation on channel {channel} was cancelled")]
    Cancelled { channel: &'static str },
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Producing half of a bounded channel. Cheap to clone.
#[derive(Debug)]
pub struct ChannelSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    destroyed: CancellationToken,
}

impl<T> Clone for ChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            destroyed: self.destroyed.clone(),
        }
    }
}

impl<T> ChannelSender<T> {
    /// Enqueue `value`, waiting while the channel is full.
    pub async fn send(&self, value: T, cancel: &CancellationToken) -> Result<(), ChannelError> {
        let channel = self.name;
        tokio::select! {
            biased;
            _ = self.destroyed.cancelled() => Err(ChannelError::Closed { channel }),
            _ = cancel.cancelled() => Err(ChannelError::Cancelled { channel }),
            result = self.tx.send(value) => result.map_err(|_| ChannelError::Closed { channel }),
        }
    }

    /// Number of messages currently buffered.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Consuming half of a bounded channel. Clones share one queue, so each
/// message is delivered to exactly one of them.
#[derive(Debug)]
pub struct ChannelReceiver<T> {
    name: &'static str,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    destroyed: CancellationToken,
}

impl<T> Clone for ChannelReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            rx: Arc::clone(&self.rx),
            destroyed: self.destroyed.clone(),
        }
    }
}

impl<T> ChannelReceiver<T> {
    /// Dequeue the next message, waiting while the channel is empty.
    ///
    /// Fails with [`ChannelError::Closed`] once the channel is destroyed or
    /// drained with no senders left.
    pub async fn recv(&self, cancel: &CancellationToken) -> Result<T, ChannelError> {
        let channel = self.name;
        let next = async {
            let mut rx = self.rx.lock().await;
            rx.recv().await.ok_or(ChannelError::Closed { channel })
        };
        tokio::select! {
            biased;
            _ = self.destroyed.cancelled() => Err(ChannelError::Closed { channel }),
            _ = cancel.cancelled() => Err(ChannelError::Cancelled { channel }),
            result = next => result,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Create a bounded channel named `name` holding at most `capacity`
/// in-flight messages.
pub fn bounded<T>(
    name: &'static str,
    capacity: usize,
) -> Result<(ChannelSender<T>, ChannelReceiver<T>, CancellationToken), ChannelError> {
    if capacity == 0 || capacity > MAX_QUEUE_CAPACITY {
        return Err(ChannelError::InvalidCapacity {
            channel: name,
            capacity,
        });
    }

    let (tx, rx) = mpsc::channel(capacity);
    let destroyed = CancellationToken::new();

    let sender = ChannelSender {
        name,
        tx,
        destroyed: destroyed.clone(),
    };
    let receiver = ChannelReceiver {
        name,
        rx: Arc::new(Mutex::new(rx)),
        destroyed: destroyed.clone(),
    };

    Ok((sender, receiver, destroyed))
}

// ---------------------------------------------------------------------------
// ChannelPair
// ---------------------------------------------------------------------------

/// The task and result channels of one dispatcher run.
#[derive(Debug)]
pub struct ChannelPair {
    task_tx: ChannelSender<TaskDescriptor>,
    task_rx: ChannelReceiver<TaskDescriptor>,
    result_tx: ChannelSender<WorkerSummary>,
    result_rx: ChannelReceiver<WorkerSummary>,
    guard: ChannelGuard,
}

impl ChannelPair {
    /// Create both channels with the same capacity.
    ///
    /// If the second creation fails the first channel is destroyed before
    /// the error is returned.
    pub fn create(capacity: usize) -> Result<Self, ChannelError> {
        let (task_tx, task_rx, task_id) = bounded(TASK_CHANNEL, capacity)?;
        let (result_tx, result_rx, result_id) = match bounded(RESULT_CHANNEL, capacity) {
            Ok(channel) => channel,
            Err(e) => {
                task_id.cancel();
                return Err(e);
            }
        };

        tracing::debug!(capacity, "Created task and result channels");

        Ok(Self {
            task_tx,
            task_rx,
            result_tx,
            result_rx,
            guard: ChannelGuard {
                identities: vec![(TASK_CHANNEL, task_id), (RESULT_CHANNEL, result_id)],
            },
        })
    }

    /// Split into the four handles plus the guard that destroys both
    /// channels when dropped.
    pub fn split(
        self,
    ) -> (
        ChannelSender<TaskDescriptor>,
        ChannelReceiver<TaskDescriptor>,
        ChannelSender<WorkerSummary>,
        ChannelReceiver<WorkerSummary>,
        ChannelGuard,
    ) {
        (
            self.task_tx,
            self.task_rx,
            self.result_tx,
            self.result_rx,
            self.guard,
        )
    }
}

/// Owns the identities of a set of channels and destroys them on drop.
///
/// Destroying is idempotent: a channel that is already destroyed is left
/// as is.
#[derive(Debug)]
pub struct ChannelGuard {
    identities: Vec<(&'static str, CancellationToken)>,
}

impl ChannelGuard {
    /// Destroy every owned channel now.
    pub fn destroy(&self) {
        for (name, id) in &self.identities {
            if !id.is_cancelled() {
                id.cancel();
                tracing::debug!(channel = %name, "Destroyed channel");
            }
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.identities.iter().all(|(_, id)| id.is_cancelled())
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
