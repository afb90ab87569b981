//! Adlock Supervisor
//!
//! Runs a fixed set of worker processes on one host and restarts any that
//! crash.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;

use controller::{Supervisor, SupervisorConfig};

/// Adlock Supervisor CLI
#[derive(Parser, Debug)]
#[command(name = "supervisor")]
#[command(about = "Launches and restarts Adlock worker processes")]
struct Args {
    /// Number of workers to run
    #[arg(short, long, env = "NUM_WORKERS", default_value = "4")]
    workers: u32,

    /// Base HTTP port; worker N listens on base + N
    #[arg(long, env = "HTTP_PORT", default_value = "3000")]
    base_port: u16,

    /// Worker executable (defaults to `worker` next to this binary)
    #[arg(long)]
    worker_bin: Option<PathBuf>,

    /// Delay before restarting a crashed worker, in milliseconds
    #[arg(long, default_value = "1000")]
    restart_delay_ms: u64,

    /// How long workers get to exit on shutdown, in milliseconds
    #[arg(long, default_value = "15000")]
    shutdown_grace_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.workers == 0 {
        return Err(anyhow::anyhow!("At least one worker is required"));
    }
    if u32::from(args.base_port) + args.workers > u32::from(u16::MAX) {
        return Err(anyhow::anyhow!(
            "Port {} + {} workers exceeds 65535",
            args.base_port,
            args.workers
        ));
    }

    let worker_bin = match args.worker_bin {
        Some(path) => path,
        None => default_worker_bin()?,
    };

    info!("Starting Adlock Supervisor");
    info!("Workers: {}", args.workers);
    info!("Ports: {}..={}", args.base_port + 1, u32::from(args.base_port) + args.workers);

    let supervisor = Arc::new(Supervisor::new(SupervisorConfig {
        workers: args.workers,
        base_port: args.base_port,
        worker_bin,
        restart_delay: Duration::from_millis(args.restart_delay_ms),
        shutdown_grace: Duration::from_millis(args.shutdown_grace_ms),
    }));

    let signalled = supervisor.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping workers");
                signalled.stop();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    supervisor.run().await;

    let metrics = supervisor.metrics().await;
    info!("Supervisor stopped");
    info!("Worker starts: {}", metrics.total_starts);
    info!("Restarts: {}", metrics.total_restarts());
    info!("Spawn failures: {}", metrics.spawn_failures);

    Ok(())
}

fn default_worker_bin() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe.with_file_name(format!("worker{}", std::env::consts::EXE_SUFFIX)))
}
