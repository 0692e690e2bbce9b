//! Command-line and environment configuration for the `ventilator` binary.
//!
//! Every flag can also be supplied through the environment (a `.env` file
//! is loaded first by `main`).
//!
//! | Flag               | Env Var                  | Default |
//! |--------------------|--------------------------|---------|
//! | `-w, --workers`    | `VENTILATOR_WORKERS`     | --      |
//! | `-t, --tasks`      | `VENTILATOR_TASKS`       | --      |
//! | `-s, --queue-size` | `VENTILATOR_QUEUE_SIZE`  | --      |
//! | `--effort-unit-ms` | `EFFORT_UNIT_MS`         | `1000`  |
//! | `--seed`           | `VENTILATOR_SEED`        | random  |
//! | `--json-events`    | `VENTILATOR_JSON_EVENTS` | `false` |

use std::time::Duration;

use clap::Parser;
use ventilator_core::config::{RunConfig, DEFAULT_EFFORT_UNIT_MS};
use ventilator_core::effort::RandomEffort;
use ventilator_core::error::CoreError;

/// Distribute synthetic tasks to a pool of workers and report per-worker
/// totals.
#[derive(Debug, Clone, Parser)]
#[command(name = "ventilator", version)]
pub struct Cli {
    /// Number of concurrent workers.
    #[arg(short = 'w', long, env = "VENTILATOR_WORKERS", allow_negative_numbers = true)]
    pub workers: i64,

    /// Number of tasks to distribute.
    #[arg(short = 't', long, env = "VENTILATOR_TASKS", allow_negative_numbers = true)]
    pub tasks: i64,

    /// Capacity of the task and result queues.
    #[arg(
        short = 's',
        long = "queue-size",
        env = "VENTILATOR_QUEUE_SIZE",
        allow_negative_numbers = true
    )]
    pub queue_size: i64,

    /// Milliseconds of simulated work per unit of effort.
    #[arg(long, env = "EFFORT_UNIT_MS", default_value_t = DEFAULT_EFFORT_UNIT_MS)]
    pub effort_unit_ms: u64,

    /// Seed for task effort generation, for reproducible runs.
    #[arg(long, env = "VENTILATOR_SEED")]
    pub seed: Option<u64>,

    /// Print every progress milestone to stdout as a JSON line.
    #[arg(long, env = "VENTILATOR_JSON_EVENTS")]
    pub json_events: bool,
}

impl Cli {
    /// Validate the numeric parameters into a [`RunConfig`].
    pub fn run_config(&self) -> Result<RunConfig, CoreError> {
        RunConfig::from_raw(self.workers, self.tasks, self.queue_size)
    }

    pub fn effort_unit(&self) -> Duration {
        Duration::from_millis(self.effort_unit_ms)
    }

    /// Build the effort generator for `config`, seeded if requested.
    pub fn effort_source(&self, config: &RunConfig) -> Result<RandomEffort, CoreError> {
        match self.seed {
            Some(seed) => RandomEffort::seeded(config.effort_range(), seed),
            None => RandomEffort::new(config.effort_range()),
        }
    }
}
