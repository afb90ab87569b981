//! Adlock worker binary.
//!
//! Serves the shared record over HTTP, guarding updates with a quorum lock
//! across the configured Redis instances.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adlock_common::AdlockError;
use adlock_worker::{http, Worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let port = config.http_port().map_err(anyhow::Error::msg)?;
    let addr: SocketAddr = format!("{}:{}", config.http_host, port).parse()?;

    info!(
        worker_id = %config.worker_id,
        stores = config.store.urls.len(),
        "Starting Adlock worker"
    );

    let worker = Arc::new(Worker::connect(config)?);

    if let Err(e) = worker.start().await {
        error!(error = %e, "Fatal error during startup");
        worker.close_stores().await;
        return Err(e.into());
    }

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            worker.close_stores().await;
            return Err(AdlockError::Fatal(format!("cannot bind {}: {}", addr, e)).into());
        }
    };

    info!(addr = %addr, "Worker listening");

    // Set up graceful shutdown
    let signalled = worker.clone();
    tokio::spawn(async move {
        shutdown_requested().await;
        info!("Shutdown signal received");
        signalled.begin_shutdown();
    });

    let served = axum::serve(listener, http::router(worker.clone()))
        .with_graceful_shutdown(worker.shutdown_signal())
        .await;

    worker.stop().await?;
    served?;

    info!("Worker shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_requested() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_requested() {
    let _ = tokio::signal::ctrl_c().await;
}
