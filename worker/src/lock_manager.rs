//! Quorum lock over independent store instances.
//!
//! A lock is held when a majority of instances accepted a set-if-absent of
//! the resource key to a fresh fencing token. Its usable lifetime is the TTL
//! minus the time spent acquiring and a drift allowance.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, instrument, warn};

use adlock_common::{AdlockError, FencingToken, ResourceKey, Result, StoreId};
use adlock_store::StoreClient;

use crate::config::QuorumConfig;
use crate::metrics::Metrics;

/// A held quorum lock.
#[derive(Debug, Clone)]
pub struct Lock {
    /// Resource the lock guards.
    pub resource: ResourceKey,
    /// Value written on every instance.
    pub token: FencingToken,
    /// When the winning attempt started.
    pub acquired_at: Instant,
    /// After this instant the lock must be treated as lost.
    pub expires_at: Instant,
    /// Instances that accepted the token.
    pub quorum: BTreeSet<StoreId>,
    /// Shared between clones so the release is counted once.
    released: Arc<AtomicBool>,
}

impl Lock {
    /// Check if lock has expired.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Get remaining time until expiry.
    pub fn remaining_time(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Check if release has already been issued.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// Mutual exclusion over N independent store instances.
pub struct QuorumLock {
    stores: Vec<Arc<dyn StoreClient>>,
    config: QuorumConfig,
    metrics: Arc<Metrics>,
}

impl QuorumLock {
    /// Create a new quorum lock.
    pub fn new(stores: Vec<Arc<dyn StoreClient>>, config: QuorumConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            stores,
            config,
            metrics,
        }
    }

    /// Instances that must agree for the lock to be held.
    pub fn quorum(&self) -> usize {
        self.stores.len() / 2 + 1
    }

    /// Usable lock lifetime after spending `elapsed` acquiring a lock of `ttl`.
    ///
    /// Returns `None` when nothing usable remains.
    pub fn validity_for(&self, ttl: Duration, elapsed: Duration) -> Option<Duration> {
        let drift = ttl.mul_f64(self.config.drift_factor) + self.config.clock_drift;
        ttl.checked_sub(elapsed)?
            .checked_sub(drift)
            .filter(|validity| !validity.is_zero())
    }

    /// Acquire the lock on `resource`, retrying until the attempt budget runs out.
    ///
    /// Running out of attempts yields [`AdlockError::LockUnavailable`].
    #[instrument(skip(self, resource), fields(resource = %resource))]
    pub async fn acquire(&self, resource: ResourceKey, ttl: Duration) -> Result<Lock> {
        let token = FencingToken::generate();
        let attempts = self.config.max_attempts();

        for attempt in 1..=attempts {
            self.metrics.lock_attempt();

            if let Some(lock) = self.try_acquire(resource, token, ttl).await {
                self.metrics.lock_acquired();
                info!(
                    attempt,
                    validity_ms = lock.remaining_time().as_millis() as u64,
                    instances = lock.quorum.len(),
                    "Lock acquired"
                );
                return Ok(lock);
            }

            if attempt < attempts {
                tokio::time::sleep(self.retry_delay()).await;
            }
        }

        self.metrics.lock_unavailable();
        info!(attempts, "Lock unavailable, retries exhausted");
        Err(AdlockError::LockUnavailable { resource })
    }

    /// Release the lock on every instance that still holds its token.
    ///
    /// Safe to call on expired or already released locks. Per-instance
    /// failures are logged; the key expires on its own.
    #[instrument(skip(self, lock), fields(resource = %lock.resource))]
    pub async fn release(&self, lock: &Lock) {
        let failures = self.release_token(lock.resource, lock.token).await;
        if !lock.released.swap(true, Ordering::AcqRel) {
            self.metrics.lock_released();
        }
        if failures == 0 {
            debug!("Lock released");
        }
    }

    async fn try_acquire(&self, resource: ResourceKey, token: FencingToken, ttl: Duration) -> Option<Lock> {
        let key = resource.store_key();
        let value = token.to_string();
        let value = value.as_str();
        let instance_timeout = self.config.instance_timeout;
        let start = Instant::now();

        let outcomes = join_all(self.stores.iter().map(|store| async move {
            let outcome = timeout(instance_timeout, store.set_if_absent(key, value, ttl)).await;
            (store.id().clone(), outcome)
        }))
        .await;

        let mut quorum = BTreeSet::new();
        for (store, outcome) in outcomes {
            match outcome {
                Ok(Ok(true)) => {
                    quorum.insert(store);
                }
                Ok(Ok(false)) => debug!(store = %store, "Resource held elsewhere"),
                Ok(Err(e)) => debug!(store = %store, error = %e, "Instance failed during acquire"),
                Err(_) => debug!(store = %store, "Instance timed out during acquire"),
            }
        }

        let elapsed = start.elapsed();
        if quorum.len() >= self.quorum() {
            if let Some(validity) = self.validity_for(ttl, elapsed) {
                return Some(Lock {
                    resource,
                    token,
                    acquired_at: start,
                    expires_at: start + elapsed + validity,
                    quorum,
                    released: Arc::new(AtomicBool::new(false)),
                });
            }
            debug!(elapsed_ms = elapsed.as_millis() as u64, "Quorum reached too late");
        }

        // A failed or timed-out reply may still hide a successful set.
        self.release_token(resource, token).await;
        None
    }

    async fn release_token(&self, resource: ResourceKey, token: FencingToken) -> usize {
        let key = resource.store_key();
        let value = token.to_string();
        let value = value.as_str();
        let instance_timeout = self.config.instance_timeout;

        let outcomes = join_all(self.stores.iter().map(|store| async move {
            let outcome = timeout(instance_timeout, store.delete_if_equals(key, value)).await;
            (store.id().clone(), outcome)
        }))
        .await;

        let mut failures = 0;
        for (store, outcome) in outcomes {
            let error = match outcome {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "timed out".to_string(),
            };
            failures += 1;
            self.metrics.release_failed();
            warn!(store = %store, error = %error, "Lock release failed, relying on TTL expiry");
        }
        failures
    }

    fn retry_delay(&self) -> Duration {
        let jitter_ms = self.config.retry_jitter.as_millis() as u64;
        let jitter = rand::thread_rng().gen_range(0..=jitter_ms);
        self.config.retry_delay + Duration::from_millis(jitter)
    }
}
