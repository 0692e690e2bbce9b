//! `ventilator-worker` library crate.
//!
//! Channels, the worker loop and the dispatcher that ties them together.
//! The binary entrypoint lives in `main.rs`.
//!
//! - [`ChannelPair`](channel::ChannelPair) — bounded task and result queues.
//! - [`Worker`](worker::Worker) — receive, execute, report.
//! - [`Dispatcher`](dispatcher::Dispatcher) — fan out tasks, fan in summaries.
//! - [`EventBus`](bus::EventBus) — progress milestones for observers.

pub mod bus;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod worker;
pub mod workload;

pub use bus::{DispatchEvent, EventBus, Milestone};
pub use dispatcher::{ChildTerminationError, DispatchError, Dispatcher, RunReport};
pub use worker::{Worker, WorkerError, WorkerState};
pub use workload::{SleepWorkload, Workload, WorkloadError};
