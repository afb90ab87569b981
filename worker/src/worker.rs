//! Worker lifecycle: startup, warm-up and graceful shutdown.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use adlock_common::{AdlockError, Result, WorkerId};
use adlock_store::{RedisStore, StoreClient};

use crate::config::WorkerConfig;
use crate::lock_manager::QuorumLock;
use crate::metrics::Metrics;
use crate::runner::LockedOperationRunner;
use crate::shared_state::SharedStateManager;
use crate::state::WorkerState;

/// One worker process: stores, lock, shared state and runner.
pub struct Worker {
    /// Configuration.
    config: WorkerConfig,
    /// OS process id, reported by `/status`.
    process_id: u32,
    /// Current worker state.
    state: Arc<RwLock<WorkerState>>,
    /// Store instances backing the quorum. The first one also holds the record.
    stores: Vec<Arc<dyn StoreClient>>,
    /// Quorum lock over `stores`.
    lock: Arc<QuorumLock>,
    /// Shared record access.
    shared_state: Arc<SharedStateManager>,
    /// Guarded operation runner.
    runner: Arc<LockedOperationRunner>,
    /// Counters exposed on `/metrics`.
    metrics: Arc<Metrics>,
    /// Flips to true when shutdown begins.
    shutdown_tx: watch::Sender<bool>,
}

impl Worker {
    /// Create a worker over already constructed store clients.
    pub fn new(config: WorkerConfig, stores: Vec<Arc<dyn StoreClient>>) -> Result<Self> {
        let data_store = stores
            .first()
            .cloned()
            .ok_or_else(|| AdlockError::Fatal("no store instances configured".to_string()))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(Metrics::new());
        let lock = Arc::new(QuorumLock::new(
            stores.clone(),
            config.quorum.clone(),
            metrics.clone(),
        ));
        let shared_state = Arc::new(SharedStateManager::new(
            data_store,
            config.worker_id,
            config.warmup_check_attempts,
            config.warmup_check_backoff,
            metrics.clone(),
        ));
        let runner = Arc::new(LockedOperationRunner::new(
            lock.clone(),
            shared_state.clone(),
            metrics.clone(),
            &config,
            shutdown_rx,
        ));

        Ok(Self {
            config,
            process_id: std::process::id(),
            state: Arc::new(RwLock::new(WorkerState::Starting)),
            stores,
            lock,
            shared_state,
            runner,
            metrics,
            shutdown_tx,
        })
    }

    /// Create a worker connected to the Redis instances in `config.store`.
    pub fn connect(config: WorkerConfig) -> Result<Self> {
        let stores = RedisStore::from_config(&config.store)
            .map_err(|e| AdlockError::Fatal(format!("invalid store configuration: {}", e)))?
            .into_iter()
            .map(|store| Arc::new(store) as Arc<dyn StoreClient>)
            .collect();
        Self::new(config, stores)
    }

    /// Verify store connectivity and run warm-up.
    ///
    /// Fails with [`AdlockError::Fatal`] when fewer than a quorum of stores
    /// answer. Warm-up failures are logged and do not prevent startup.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn start(&self) -> Result<()> {
        info!(
            process_id = self.process_id,
            stores = self.stores.len(),
            "Starting worker"
        );

        let reachable = self.reachable_stores().await;
        if reachable < self.lock.quorum() {
            return Err(AdlockError::Fatal(format!(
                "only {} of {} store instances reachable, {} required",
                reachable,
                self.stores.len(),
                self.lock.quorum()
            )));
        }

        *self.state.write() = WorkerState::WarmingUp;
        match self.runner.run_warmup().await {
            Ok(Some(record)) => info!(record = ?record, "Warm-up finished"),
            Ok(None) => info!("Warm-up skipped, no record stored yet"),
            Err(e) => warn!(error = %e, "Warm-up failed, continuing startup"),
        }

        *self.state.write() = WorkerState::Running;
        info!("Worker started");
        Ok(())
    }

    /// Stop accepting new work. In-flight operations keep running.
    pub fn begin_shutdown(&self) {
        {
            let mut state = self.state.write();
            if state.is_terminal() {
                return;
            }
            *state = WorkerState::ShuttingDown;
        }
        self.shutdown_tx.send_replace(true);
    }

    /// Resolves once shutdown has begun.
    pub fn shutdown_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            let _ = rx.wait_for(|shutting_down| *shutting_down).await;
        }
    }

    /// Stop the worker gracefully.
    ///
    /// Waits up to the configured grace period for locked operations, then
    /// closes every store connection.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping worker");
        self.begin_shutdown();

        if !self.runner.wait_idle(self.config.shutdown_grace).await {
            warn!(
                in_flight = self.runner.in_flight(),
                grace_ms = self.config.shutdown_grace.as_millis() as u64,
                "Grace period elapsed with operations in flight, their locks will expire"
            );
        }

        self.close_stores().await;
        *self.state.write() = WorkerState::Stopped;

        info!("Worker stopped");
        Ok(())
    }

    /// Close every store connection, logging failures.
    pub async fn close_stores(&self) {
        let results = join_all(self.stores.iter().map(|store| async move {
            (store.id().clone(), store.close().await)
        }))
        .await;

        for (store, result) in results {
            if let Err(e) = result {
                error!(store = %store, error = %e, "Failed to close store connection");
            }
        }
    }

    /// Ping every store. Healthy while a quorum answers.
    pub async fn check_health(&self) -> Result<usize> {
        let reachable = self.reachable_stores().await;
        if reachable >= self.lock.quorum() {
            Ok(reachable)
        } else {
            Err(AdlockError::Connectivity(format!(
                "{} of {} store instances reachable",
                reachable,
                self.stores.len()
            )))
        }
    }

    /// Get the worker ID.
    pub fn worker_id(&self) -> WorkerId {
        self.config.worker_id
    }

    /// OS process id of this worker.
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Get the current worker state.
    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Get a handle to the operation runner.
    pub fn runner(&self) -> Arc<LockedOperationRunner> {
        self.runner.clone()
    }

    /// Get the shared record manager.
    pub fn shared_state(&self) -> &SharedStateManager {
        &self.shared_state
    }

    /// Get worker metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    async fn reachable_stores(&self) -> usize {
        let results = join_all(self.stores.iter().map(|store| async move {
            match store.ping().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(store = %store.id(), error = %e, "Store instance unreachable");
                    false
                }
            }
        }))
        .await;

        results.into_iter().filter(|ok| *ok).count()
    }
}
