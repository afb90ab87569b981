//! Supervisor counters.

use std::collections::BTreeMap;

/// Process lifecycle counters, per worker id.
#[derive(Debug, Clone, Default)]
pub struct SupervisorMetrics {
    /// Successful spawns, restarts included.
    pub total_starts: u64,
    /// Spawns that failed outright.
    pub spawn_failures: u64,
    /// Abnormal exits followed by a restart.
    restarts: BTreeMap<u32, u64>,
}

impl SupervisorMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful spawn.
    pub fn record_start(&mut self) {
        self.total_starts += 1;
    }

    /// Record a spawn that failed before the process ran.
    pub fn record_spawn_failure(&mut self) {
        self.spawn_failures += 1;
    }

    /// Record that `worker_id` was relaunched after an abnormal exit.
    pub fn record_restart(&mut self, worker_id: u32) {
        *self.restarts.entry(worker_id).or_insert(0) += 1;
    }

    /// Restarts of a single worker.
    pub fn restarts_of(&self, worker_id: u32) -> u64 {
        self.restarts.get(&worker_id).copied().unwrap_or(0)
    }

    /// Restarts across all workers.
    pub fn total_restarts(&self) -> u64 {
        self.restarts.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restarts_are_counted_per_worker() {
        let mut metrics = SupervisorMetrics::new();
        metrics.record_restart(1);
        metrics.record_restart(1);
        metrics.record_restart(3);

        assert_eq!(metrics.restarts_of(1), 2);
        assert_eq!(metrics.restarts_of(2), 0);
        assert_eq!(metrics.total_restarts(), 3);
    }
}
