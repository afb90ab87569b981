//! Error types for adlock operations.

use crate::ResourceKey;
use thiserror::Error;

/// Main error type for adlock operations.
///
/// Callers discriminate outcomes by variant. `LockUnavailable` is an expected
/// result under contention and is never logged as an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdlockError {
    /// Quorum not reached within the retry budget.
    #[error("Lock unavailable for resource {resource}")]
    LockUnavailable { resource: ResourceKey },

    /// Store unreachable after reconnect attempts.
    #[error("Store connectivity error: {0}")]
    Connectivity(String),

    /// Warm-up freshness check could not be completed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Failure inside a guarded read-modify-write.
    #[error("Operation error: {0}")]
    Operation(String),

    /// The worker cannot reach a servable state.
    #[error("Fatal startup error: {0}")]
    Fatal(String),
}

impl AdlockError {
    /// Check if the caller may simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdlockError::LockUnavailable { .. } | AdlockError::Connectivity(_)
        )
    }

    /// Check if this is the contention outcome rather than a failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AdlockError::LockUnavailable { .. })
    }

    /// Get error code for responses and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            AdlockError::LockUnavailable { .. } => "LOCK_UNAVAILABLE",
            AdlockError::Connectivity(_) => "CONNECTIVITY_ERROR",
            AdlockError::Validation(_) => "VALIDATION_ERROR",
            AdlockError::Operation(_) => "OPERATION_ERROR",
            AdlockError::Fatal(_) => "FATAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for AdlockError {
    fn from(e: serde_json::Error) -> Self {
        AdlockError::Operation(format!("malformed stored data: {}", e))
    }
}

/// Result type alias for adlock operations.
pub type Result<T> = std::result::Result<T, AdlockError>;
