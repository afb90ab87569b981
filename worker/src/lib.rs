//! Adlock worker
//!
//! A worker serves the shared record over HTTP. Updates run under a quorum
//! lock held across independent store instances, and warm-up reuses the
//! stored record while its marker is current.

pub mod config;
pub mod http;
pub mod lock_manager;
pub mod metrics;
pub mod runner;
pub mod shared_state;
pub mod state;
pub mod worker;

pub use config::{QuorumConfig, WorkerConfig};
pub use lock_manager::{Lock, QuorumLock};
pub use metrics::{Metrics, MetricsSnapshot};
pub use runner::LockedOperationRunner;
pub use shared_state::SharedStateManager;
pub use state::WorkerState;
pub use worker::Worker;
