//! Lock and operation counters for worker monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Worker metrics.
pub struct Metrics {
    /// Locks acquired.
    pub locks_acquired: AtomicU64,
    /// Acquisitions that ran out of retries.
    pub locks_unavailable: AtomicU64,
    /// Individual quorum attempts, successful or not.
    pub lock_attempts: AtomicU64,
    /// Locks released.
    pub locks_released: AtomicU64,
    /// Per-instance release failures (left to TTL expiry).
    pub release_failures: AtomicU64,
    /// Locks currently held by this worker.
    pub locks_active: AtomicU64,
    /// Guarded operations that wrote the record.
    pub operations_completed: AtomicU64,
    /// Guarded operations that failed after acquiring the lock.
    pub operations_failed: AtomicU64,
    /// Warm-ups that re-initialized the record.
    pub warmup_reinitialized: AtomicU64,
    /// Warm-ups that reused the stored record.
    pub warmup_reused: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub locks_acquired: u64,
    pub locks_unavailable: u64,
    pub lock_attempts: u64,
    pub locks_released: u64,
    pub release_failures: u64,
    pub locks_active: u64,
    pub operations_completed: u64,
    pub operations_failed: u64,
    pub warmup_reinitialized: u64,
    pub warmup_reused: u64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            locks_acquired: AtomicU64::new(0),
            locks_unavailable: AtomicU64::new(0),
            lock_attempts: AtomicU64::new(0),
            locks_released: AtomicU64::new(0),
            release_failures: AtomicU64::new(0),
            locks_active: AtomicU64::new(0),
            operations_completed: AtomicU64::new(0),
            operations_failed: AtomicU64::new(0),
            warmup_reinitialized: AtomicU64::new(0),
            warmup_reused: AtomicU64::new(0),
        }
    }

    /// Record one quorum attempt.
    pub fn lock_attempt(&self) {
        self.lock_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record lock acquired.
    pub fn lock_acquired(&self) {
        self.locks_acquired.fetch_add(1, Ordering::Relaxed);
        self.locks_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record lock acquisition giving up.
    pub fn lock_unavailable(&self) {
        self.locks_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    /// Record lock released.
    pub fn lock_released(&self) {
        self.locks_released.fetch_add(1, Ordering::Relaxed);
        self.locks_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a release failure on one instance.
    pub fn release_failed(&self) {
        self.release_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record operation outcome.
    pub fn operation_finished(&self, success: bool) {
        if success {
            self.operations_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.operations_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record warm-up outcome.
    pub fn warmup_finished(&self, reinitialized: bool) {
        if reinitialized {
            self.warmup_reinitialized.fetch_add(1, Ordering::Relaxed);
        } else {
            self.warmup_reused.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            locks_acquired: self.locks_acquired.load(Ordering::Relaxed),
            locks_unavailable: self.locks_unavailable.load(Ordering::Relaxed),
            lock_attempts: self.lock_attempts.load(Ordering::Relaxed),
            locks_released: self.locks_released.load(Ordering::Relaxed),
            release_failures: self.release_failures.load(Ordering::Relaxed),
            locks_active: self.locks_active.load(Ordering::Relaxed),
            operations_completed: self.operations_completed.load(Ordering::Relaxed),
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
            warmup_reinitialized: self.warmup_reinitialized.load(Ordering::Relaxed),
            warmup_reused: self.warmup_reused.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_lifecycle_counters() {
        let metrics = Metrics::new();
        metrics.lock_acquired();
        metrics.lock_acquired();
        metrics.lock_released();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.locks_acquired, 2);
        assert_eq!(snapshot.locks_released, 1);
        assert_eq!(snapshot.locks_active, 1);
    }

    #[test]
    fn test_operation_counters() {
        let metrics = Metrics::new();
        metrics.operation_finished(true);
        metrics.operation_finished(false);
        metrics.operation_finished(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operations_completed, 1);
        assert_eq!(snapshot.operations_failed, 2);
    }
}
