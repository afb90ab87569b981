//! Worker process supervision.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::process::{Child, Command};
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use crate::metrics::SupervisorMetrics;

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Number of workers, ids 1..=workers.
    pub workers: u32,
    /// Base HTTP port handed to every worker.
    pub base_port: u16,
    /// Worker executable.
    pub worker_bin: PathBuf,
    /// Pause before restarting a worker that exited abnormally.
    pub restart_delay: Duration,
    /// How long children get to exit after a stop before being killed.
    pub shutdown_grace: Duration,
}

/// Launches workers and keeps them running until stopped.
pub struct Supervisor {
    config: SupervisorConfig,
    metrics: Arc<RwLock<SupervisorMetrics>>,
    stop_tx: watch::Sender<bool>,
}

impl Supervisor {
    /// Create a new supervisor.
    pub fn new(config: SupervisorConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            config,
            metrics: Arc::new(RwLock::new(SupervisorMetrics::new())),
            stop_tx,
        }
    }

    /// Supervise every worker until each has exited cleanly or a stop was
    /// requested.
    pub async fn run(&self) {
        info!(
            workers = self.config.workers,
            worker_bin = %self.config.worker_bin.display(),
            "Launching workers"
        );

        let handles: Vec<_> = (1..=self.config.workers)
            .map(|worker_id| {
                let config = self.config.clone();
                let metrics = self.metrics.clone();
                let stop = self.stop_tx.subscribe();
                tokio::spawn(supervise(worker_id, config, metrics, stop))
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Supervision task panicked");
            }
        }
    }

    /// Stop restarting workers and wind down the running ones.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Get supervisor metrics.
    pub async fn metrics(&self) -> SupervisorMetrics {
        self.metrics.read().await.clone()
    }
}

async fn supervise(
    worker_id: u32,
    config: SupervisorConfig,
    metrics: Arc<RwLock<SupervisorMetrics>>,
    mut stop: watch::Receiver<bool>,
) {
    let mut restarting = false;

    while !*stop.borrow() {
        let mut child = match spawn_worker(&config, worker_id) {
            Ok(child) => {
                let mut metrics = metrics.write().await;
                metrics.record_start();
                if restarting {
                    metrics.record_restart(worker_id);
                }
                info!(worker_id, pid = child.id(), restarted = restarting, "Worker started");
                child
            }
            Err(e) => {
                metrics.write().await.record_spawn_failure();
                error!(worker_id, error = %e, "Failed to spawn worker");
                if wait_or_stop(&mut stop, config.restart_delay).await {
                    break;
                }
                continue;
            }
        };

        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) if status.success() => {
                        info!(worker_id, "Worker exited cleanly");
                        break;
                    }
                    Ok(status) => log_abnormal_exit(worker_id, status),
                    Err(e) => error!(worker_id, error = %e, "Failed to wait for worker"),
                }

                if wait_or_stop(&mut stop, config.restart_delay).await {
                    break;
                }
                restarting = true;
            }
            _ = stopped(&mut stop) => {
                wind_down(worker_id, &mut child, config.shutdown_grace).await;
                break;
            }
        }
    }
}

fn spawn_worker(config: &SupervisorConfig, worker_id: u32) -> std::io::Result<Child> {
    Command::new(&config.worker_bin)
        .env("WORKER_ID", worker_id.to_string())
        .env("HTTP_PORT", config.base_port.to_string())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}

/// Children share the terminal's process group and receive the same
/// interrupt; this only waits for them and kills stragglers.
async fn wind_down(worker_id: u32, child: &mut Child, grace: Duration) {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => info!(worker_id, code = ?status.code(), "Worker stopped"),
        Ok(Err(e)) => error!(worker_id, error = %e, "Failed to wait for worker"),
        Err(_) => {
            warn!(worker_id, grace_ms = grace.as_millis() as u64, "Worker did not stop in time, killing");
            if let Err(e) = child.kill().await {
                error!(worker_id, error = %e, "Failed to kill worker");
            }
        }
    }
}

fn log_abnormal_exit(worker_id: u32, status: ExitStatus) {
    match status.code() {
        Some(code) => warn!(worker_id, code, "Worker exited abnormally"),
        None => warn!(worker_id, "Worker terminated by signal"),
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopping| *stopping).await;
}

/// Sleep for `delay`; returns true if a stop arrived first.
async fn wait_or_stop(stop: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    let interrupted = tokio::time::timeout(delay, stopped(stop)).await.is_ok();
    interrupted || *stop.borrow()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn config(worker_bin: &str, workers: u32) -> SupervisorConfig {
        SupervisorConfig {
            workers,
            base_port: 3000,
            worker_bin: PathBuf::from(worker_bin),
            restart_delay: Duration::from_millis(20),
            shutdown_grace: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_clean_exit_is_not_restarted() {
        let supervisor = Supervisor::new(config("/bin/true", 2));
        tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .unwrap();

        let metrics = supervisor.metrics().await;
        assert_eq!(metrics.total_starts, 2);
        assert_eq!(metrics.total_restarts(), 0);
    }

    #[tokio::test]
    async fn test_failing_worker_is_restarted_until_stopped() {
        let supervisor = Arc::new(Supervisor::new(config("/bin/false", 1)));
        let running = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run().await }
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        supervisor.stop();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();

        let metrics = supervisor.metrics().await;
        assert!(metrics.restarts_of(1) >= 1);
        assert_eq!(metrics.total_starts, metrics.restarts_of(1) + 1);
    }

    #[tokio::test]
    async fn test_missing_binary_counts_spawn_failures() {
        let supervisor = Arc::new(Supervisor::new(config("/nonexistent/worker", 1)));
        let running = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run().await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        supervisor.stop();
        running.await.unwrap();

        let metrics = supervisor.metrics().await;
        assert!(metrics.spawn_failures >= 1);
        assert_eq!(metrics.total_starts, 0);
    }

    #[tokio::test]
    async fn test_stop_kills_stragglers_after_grace() {
        let mut child = Command::new("/bin/sleep").arg("30").kill_on_drop(true).spawn().unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            wind_down(1, &mut child, Duration::from_millis(50)),
        )
        .await
        .unwrap();

        assert!(child.try_wait().unwrap().is_some());
    }
}
