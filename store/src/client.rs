//! The store client trait shared by all backends.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use adlock_common::{AdlockError, StoreId};

/// Errors raised by a single store instance.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The instance could not be reached, even after reconnecting.
    #[error("Store {store} unreachable: {reason}")]
    Unreachable { store: StoreId, reason: String },

    /// A command did not complete in time.
    #[error("Store {store} timed out after {timeout_ms}ms")]
    Timeout { store: StoreId, timeout_ms: u64 },

    /// The instance answered with an error.
    #[error("Store {store} command failed: {reason}")]
    Command { store: StoreId, reason: String },

    /// The client was closed.
    #[error("Store {0} is closed")]
    Closed(StoreId),
}

impl StoreError {
    /// Check if the failure is a connectivity problem rather than a command error.
    pub fn is_connectivity(&self) -> bool {
        !matches!(self, StoreError::Command { .. })
    }
}

impl From<StoreError> for AdlockError {
    fn from(e: StoreError) -> Self {
        if e.is_connectivity() {
            AdlockError::Connectivity(e.to_string())
        } else {
            AdlockError::Operation(e.to_string())
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A connection to one key-value store instance.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Identifier of this instance.
    fn id(&self) -> &StoreId;

    /// Set `key` to `value` with expiry `ttl` only if the key is absent.
    ///
    /// Returns `true` when the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete `key` only if it currently holds `value`.
    ///
    /// Returns `true` when a key was deleted.
    async fn delete_if_equals(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Read the value at `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditionally write `value` at `key` without expiry.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Check the instance is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Close the connection. Further calls fail with [`StoreError::Closed`].
    async fn close(&self) -> StoreResult<()>;
}
