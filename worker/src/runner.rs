//! Runs work under a quorum lock with guaranteed release.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use adlock_common::{AdlockError, ResourceKey, Result, SharedRecord, WorkerId};

use crate::config::WorkerConfig;
use crate::lock_manager::{Lock, QuorumLock};
use crate::metrics::Metrics;
use crate::shared_state::SharedStateManager;

/// Executes guarded operations against the shared record.
pub struct LockedOperationRunner {
    lock: Arc<QuorumLock>,
    state: Arc<SharedStateManager>,
    metrics: Arc<Metrics>,
    worker_id: WorkerId,
    cache_ttl: Duration,
    warmup_ttl: Duration,
    shutdown: watch::Receiver<bool>,
    in_flight: watch::Sender<usize>,
}

/// Decrements the in-flight count when dropped.
struct InFlight<'a>(&'a watch::Sender<usize>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl LockedOperationRunner {
    /// Create a runner. New work is refused once `shutdown` turns true.
    pub fn new(
        lock: Arc<QuorumLock>,
        state: Arc<SharedStateManager>,
        metrics: Arc<Metrics>,
        config: &WorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            lock,
            state,
            metrics,
            worker_id: config.worker_id,
            cache_ttl: config.cache_lock_ttl,
            warmup_ttl: config.warmup_lock_ttl,
            shutdown,
            in_flight,
        }
    }

    /// Acquire `cache`, simulate `work`, write the record labelled `label`,
    /// then release.
    ///
    /// A run counts as in flight from the first acquire attempt, and one
    /// whose lock arrives after shutdown began gives it back unused. The lock
    /// is released whatever the outcome. If the lock's validity ran
    /// out during the work, nothing is written and an operation error is
    /// returned.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn run(&self, label: &str, work: Duration) -> Result<SharedRecord> {
        if self.is_shutting_down() {
            info!("Refusing new work during shutdown");
            return Err(AdlockError::LockUnavailable {
                resource: ResourceKey::Cache,
            });
        }

        let _in_flight = self.track();
        let started = Instant::now();
        let lock = self.lock.acquire(ResourceKey::Cache, self.cache_ttl).await?;
        if self.is_shutting_down() {
            info!("Shutdown began while acquiring, giving the lock back");
            self.lock.release(&lock).await;
            return Err(AdlockError::LockUnavailable {
                resource: ResourceKey::Cache,
            });
        }
        info!(
            wait_ms = started.elapsed().as_millis() as u64,
            "Starting guarded operation"
        );

        let result = self.guarded_update(&lock, label, work).await;
        self.lock.release(&lock).await;

        match &result {
            Ok(record) => {
                self.metrics.operation_finished(true);
                info!(
                    label = %record.label,
                    timestamp = %record.timestamp,
                    total_ms = started.elapsed().as_millis() as u64,
                    "Guarded operation completed"
                );
            }
            Err(e) => {
                self.metrics.operation_finished(false);
                error!(error = %e, "Guarded operation failed");
            }
        }

        result
    }

    /// Run warm-up under the `warmup` lock.
    ///
    /// When another worker holds the lock the stored record is returned
    /// unchanged, or `None` if there is none or it cannot be read.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn run_warmup(&self) -> Result<Option<SharedRecord>> {
        let _in_flight = self.track();
        let lock = match self.lock.acquire(ResourceKey::Warmup, self.warmup_ttl).await {
            Ok(lock) => lock,
            Err(AdlockError::LockUnavailable { .. }) => {
                info!("Warm-up lock held elsewhere, using stored record as-is");
                return Ok(match self.state.read().await {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(error = %e, "Could not read stored record");
                        None
                    }
                });
            }
            Err(e) => return Err(e),
        };

        let result = self.state.initialize_or_recover().await;
        self.lock.release(&lock).await;

        result.map(Some)
    }

    /// Number of operations acquiring or holding a lock.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until no operation holds a lock. Returns false if `grace` ran out.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let mut rx = self.in_flight.subscribe();
        let idle = matches!(
            tokio::time::timeout(grace, rx.wait_for(|count| *count == 0)).await,
            Ok(Ok(_))
        );
        idle
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn track(&self) -> InFlight<'_> {
        self.in_flight.send_modify(|count| *count += 1);
        InFlight(&self.in_flight)
    }

    async fn guarded_update(&self, lock: &Lock, label: &str, work: Duration) -> Result<SharedRecord> {
        match self.state.read().await {
            Ok(current) => info!(current = ?current, "Read current shared record"),
            Err(e) => warn!(error = %e, "Could not read current shared record"),
        }

        tokio::time::sleep(work).await;

        if lock.is_expired() {
            return Err(AdlockError::Operation(format!(
                "lock on {} expired before write",
                lock.resource
            )));
        }

        self.state.write(label).await
    }
}
