//! Identifier types for workers, stores, locks and lock resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a worker process within the cluster.
/// Worker ids are 1-based; the HTTP port is the base port plus this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u32);

impl WorkerId {
    /// Create a new worker ID.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw numeric ID.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Identity written into records created by this worker.
    pub fn record_id(&self) -> String {
        format!("worker-{}", self.0)
    }

    /// Validate the worker ID (zero is reserved for "unassigned").
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WorkerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Identifier of a single key-value store instance taking part in a quorum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(String);

impl StoreId {
    /// Create a new store ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StoreId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique value written as a lock's content.
///
/// Only the holder of the token can release the lock it guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FencingToken(Uuid);

impl FencingToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FencingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical lock names.
///
/// `Cache` guards mutation of the shared record, `Warmup` guards the startup
/// recovery path. They are independent so request traffic never waits on a
/// warm-up and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKey {
    /// Guards reads-modify-writes of the shared record.
    Cache,
    /// Guards the warm-up validity check and re-initialization.
    Warmup,
}

impl ResourceKey {
    /// Store key holding the fencing token for this resource.
    pub fn store_key(&self) -> &'static str {
        match self {
            ResourceKey::Cache => "resource:cache:write",
            ResourceKey::Warmup => "resource:warmup",
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKey::Cache => "cache",
            ResourceKey::Warmup => "warmup",
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_record_id() {
        assert_eq!(WorkerId::new(3).record_id(), "worker-3");
        assert!(WorkerId::new(1).is_valid());
        assert!(!WorkerId::new(0).is_valid());
    }

    #[test]
    fn test_fencing_tokens_are_unique() {
        let a = FencingToken::generate();
        let b = FencingToken::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_resource_keys_are_distinct() {
        assert_ne!(ResourceKey::Cache.store_key(), ResourceKey::Warmup.store_key());
        assert_eq!(ResourceKey::Cache.to_string(), "cache");
    }
}
