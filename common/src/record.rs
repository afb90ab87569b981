//! The shared record and its warm-up marker.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::time::{self, Timestamp};
use crate::WorkerId;

/// Store key holding the serialized shared record.
pub const RECORD_KEY: &str = "ADS_REDLOCK";

/// Store key holding the warm-up marker timestamp.
pub const WARMUP_MARKER_KEY: &str = "WARMUP_LAST_SUCCESSFUL";

/// Label given to a record created during warm-up.
pub const INITIAL_LABEL: &str = "initial";

/// The single piece of application state protected by the `cache` lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedRecord {
    /// Identity of the worker that last wrote the record.
    pub id: String,
    /// Name of the operation that produced this value.
    pub label: String,
    /// When the record was written.
    pub timestamp: Timestamp,
}

impl SharedRecord {
    /// Create a record stamped by the given worker.
    pub fn new(worker_id: WorkerId, label: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id: worker_id.record_id(),
            label: label.into(),
            timestamp,
        }
    }

    /// Create the record written by warm-up re-initialization.
    pub fn initial(worker_id: WorkerId, timestamp: Timestamp) -> Self {
        Self::new(worker_id, INITIAL_LABEL, timestamp)
    }

    /// Serialize for storage.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from storage.
    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Marker recording when the shared record was last validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupMarker {
    pub last_validated: Timestamp,
}

impl WarmupMarker {
    pub fn new(last_validated: Timestamp) -> Self {
        Self { last_validated }
    }

    /// Parse a stored marker; malformed markers are treated as absent.
    pub fn decode(raw: &str) -> Option<Self> {
        time::parse_timestamp(raw).map(Self::new)
    }

    pub fn encode(&self) -> String {
        time::format_timestamp(self.last_validated)
    }

    /// Whether the marker still vouches for the stored record.
    pub fn is_current(&self) -> bool {
        time::is_within_current_minute(self.last_validated)
    }
}
