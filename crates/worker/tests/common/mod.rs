//! Shared helpers for dispatcher integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use ventilator_core::config::RunConfig;
use ventilator_core::types::Effort;
use ventilator_worker::{Dispatcher, SleepWorkload, Workload, WorkloadError};

/// Dispatcher whose workload completes instantly.
pub fn instant_dispatcher(workers: i64, tasks: i64, capacity: i64) -> Dispatcher<SleepWorkload> {
    let config = RunConfig::from_raw(workers, tasks, capacity).expect("valid test config");
    Dispatcher::new(config, SleepWorkload::new(Duration::ZERO))
}

/// Records every effort it executes.
#[derive(Default, Clone)]
pub struct RecordingWorkload {
    pub executed: Arc<Mutex<Vec<Effort>>>,
}

impl RecordingWorkload {
    pub fn executed(&self) -> Vec<Effort> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Workload for RecordingWorkload {
    async fn execute(&self, effort: Effort, _cancel: &CancellationToken) -> Result<(), WorkloadError> {
        self.executed.lock().unwrap().push(effort);
        tokio::task::yield_now().await;
        Ok(())
    }
}

/// Panics when asked to execute `fatal_effort`; otherwise returns at once.
pub struct PanickingWorkload {
    pub fatal_effort: Effort,
}

#[async_trait]
impl Workload for PanickingWorkload {
    async fn execute(&self, effort: Effort, _cancel: &CancellationToken) -> Result<(), WorkloadError> {
        if effort == self.fatal_effort {
            panic!("workload crashed on effort {effort}");
        }
        Ok(())
    }
}
