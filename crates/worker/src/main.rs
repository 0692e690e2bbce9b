//! `ventilator` -- distribute synthetic tasks to a worker pool.
//!
//! Spawns the requested number of workers, feeds them randomly sized
//! tasks through a bounded queue, and prints one summary line per worker
//! once every worker has reported. See [`ventilator_worker::config`] for
//! the accepted flags and environment variables.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ventilator_worker::config::Cli;
use ventilator_worker::{DispatchEvent, Dispatcher, EventBus, SleepWorkload};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ventilator=info,ventilator_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ventilator: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli
        .run_config()
        .context("All parameters must be positive integers")?;
    let mut efforts = cli
        .effort_source(&config)
        .context("Invalid effort range")?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let bus = Arc::new(EventBus::default());
    let printer = cli
        .json_events
        .then(|| tokio::spawn(print_events(bus.subscribe())));
    let dispatcher = Dispatcher::new(config, SleepWorkload::new(cli.effort_unit()))
        .with_event_bus(Arc::clone(&bus))
        .with_cancellation(cancel);

    let report = dispatcher.run(&mut efforts).await.context("Run aborted")?;

    // Close the bus so the printer drains and exits.
    drop(dispatcher);
    drop(bus);
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            tracing::warn!(error = %e, "Event printer did not terminate cleanly");
        }
    }

    for line in report.summary_lines(cli.effort_unit()) {
        println!("{line}");
    }
    for failure in &report.join_failures {
        tracing::warn!(worker_id = failure.worker_id, reason = %failure.reason, "Join failure");
    }

    tracing::info!(
        total_tasks = report.total_tasks(),
        total_effort = report.total_effort(),
        "Run complete",
    );
    Ok(())
}

/// Echo progress milestones as JSON lines until the bus is dropped.
async fn print_events(mut rx: broadcast::Receiver<DispatchEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialise event"),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Cancel the run on SIGINT or SIGTERM.
///
/// Blocking channel operations are interrupted through the token rather
/// than by the signal itself; workers stop without reporting and the run
/// exits non-zero.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), cancelling run");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, cancelling run");
        }
    }

    cancel.cancel();
}
