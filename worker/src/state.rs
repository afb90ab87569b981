//! Worker state definitions.

/// Worker operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Connecting to the stores.
    Starting,
    /// Running warm-up under the `warmup` lock.
    WarmingUp,
    /// Serving requests.
    Running,
    /// Refusing new work, draining in-flight operations.
    ShuttingDown,
    /// Stores closed.
    Stopped,
}

impl WorkerState {
    /// Check if the worker is accepting new requests.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, WorkerState::Running)
    }

    /// Check if the worker is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Starting => "starting",
            WorkerState::WarmingUp => "warming_up",
            WorkerState::Running => "running",
            WorkerState::ShuttingDown => "shutting_down",
            WorkerState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
