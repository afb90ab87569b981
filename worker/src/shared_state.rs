//! Lifecycle of the shared record and its warm-up marker.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use adlock_common::{
    time, AdlockError, Result, SharedRecord, WarmupMarker, WorkerId, RECORD_KEY,
    WARMUP_MARKER_KEY,
};
use adlock_store::StoreClient;

use crate::metrics::Metrics;

/// Owns reads and writes of the shared record.
///
/// The record and marker live on a single data store. Writers must hold the
/// `cache` lock; warm-up callers must hold the `warmup` lock.
pub struct SharedStateManager {
    store: Arc<dyn StoreClient>,
    worker_id: WorkerId,
    check_attempts: u32,
    check_backoff: Duration,
    metrics: Arc<Metrics>,
}

impl SharedStateManager {
    /// Create a new manager over `store`.
    pub fn new(
        store: Arc<dyn StoreClient>,
        worker_id: WorkerId,
        check_attempts: u32,
        check_backoff: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            worker_id,
            check_attempts: check_attempts.max(1),
            check_backoff,
            metrics,
        }
    }

    /// Return the stored record if the warm-up marker still vouches for it,
    /// otherwise write a fresh initial record and marker.
    pub async fn initialize_or_recover(&self) -> Result<SharedRecord> {
        match self.check_with_retries().await {
            Ok(Some(record)) => {
                info!(record = ?record, "Warm-up marker is current, reusing stored record");
                self.metrics.warmup_finished(false);
                return Ok(record);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Warm-up validation failed, re-initializing"),
        }

        let now = time::now();
        let record = SharedRecord::initial(self.worker_id, now);
        self.persist(&record, WarmupMarker::new(now)).await?;
        self.metrics.warmup_finished(true);

        info!(record = ?record, "Shared record initialized");
        Ok(record)
    }

    /// Read the stored record without locking.
    pub async fn read(&self) -> Result<Option<SharedRecord>> {
        match self.store.get(RECORD_KEY).await? {
            Some(raw) => Ok(Some(SharedRecord::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the record with `label` and refresh the marker.
    ///
    /// The caller must hold the `cache` lock. The new timestamp never goes
    /// backwards relative to the stored one.
    pub async fn write(&self, label: &str) -> Result<SharedRecord> {
        let previous = match self.read().await {
            Ok(previous) => previous,
            Err(AdlockError::Operation(reason)) => {
                warn!(error = %reason, "Overwriting malformed shared record");
                None
            }
            Err(e) => return Err(e),
        };

        let now = time::now();
        let timestamp = previous.map_or(now, |p| p.timestamp.max(now));
        let record = SharedRecord::new(self.worker_id, label, timestamp);
        self.persist(&record, WarmupMarker::new(timestamp)).await?;

        debug!(record = ?record, "Shared record written");
        Ok(record)
    }

    async fn persist(&self, record: &SharedRecord, marker: WarmupMarker) -> Result<()> {
        self.store.set(RECORD_KEY, &record.encode()?).await?;
        self.store.set(WARMUP_MARKER_KEY, &marker.encode()).await?;
        Ok(())
    }

    async fn check_with_retries(&self) -> Result<Option<SharedRecord>> {
        let mut last_error = None;

        for attempt in 1..=self.check_attempts {
            match self.check().await {
                Ok(found) => return Ok(found),
                Err(e) => {
                    debug!(attempt, error = %e, "Warm-up check failed");
                    last_error = Some(e);
                }
            }

            if attempt < self.check_attempts {
                tokio::time::sleep(self.check_backoff * attempt).await;
            }
        }

        Err(AdlockError::Validation(format!(
            "warm-up check failed after {} attempts: {}",
            self.check_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// `Some` only when the marker is current and a well-formed record exists.
    async fn check(&self) -> Result<Option<SharedRecord>> {
        let raw_marker = self.store.get(WARMUP_MARKER_KEY).await?;
        let Some(marker) = raw_marker.as_deref().and_then(WarmupMarker::decode) else {
            info!("Warm-up marker missing or malformed");
            return Ok(None);
        };

        if !marker.is_current() {
            info!(last_validated = %marker.last_validated, "Warm-up marker outside validity window");
            return Ok(None);
        }

        match self.store.get(RECORD_KEY).await? {
            Some(raw) => match SharedRecord::decode(&raw) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!(error = %e, "Stored record is malformed");
                    Ok(None)
                }
            },
            None => {
                info!("Warm-up marker is current but no record is stored");
                Ok(None)
            }
        }
    }
}
