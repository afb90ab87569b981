//! In-process store with TTL support and outage injection.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use adlock_common::StoreId;

use crate::client::{StoreClient, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// Thread-safe in-memory key-value store.
///
/// Behaves like a single Redis instance for the commands the lock needs.
/// Can be marked unreachable to simulate an outage.
pub struct MemoryStore {
    id: StoreId,
    entries: DashMap<String, StoredValue>,
    reachable: AtomicBool,
    closed: AtomicBool,
    writes: AtomicU64,
    failing_reads: AtomicU32,
}

impl MemoryStore {
    /// Create an empty, reachable store.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: StoreId::new(id),
            entries: DashMap::new(),
            reachable: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            writes: AtomicU64::new(0),
            failing_reads: AtomicU32::new(0),
        }
    }

    /// Simulate the instance going down or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make the next `count` reads fail as if the connection dropped.
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Number of unconditional `set` calls served so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed(self.id.clone()));
        }
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable {
                store: self.id.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    fn id(&self) -> &StoreId {
        &self.id
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.check()?;
        let now = Instant::now();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at: Some(now + ttl),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_expired(now) {
                    existing.insert(stored);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(stored);
                Ok(true)
            }
        }
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.check()?;
        let now = Instant::now();
        let removed = self
            .entries
            .remove_if(key, |_, stored| !stored.is_expired(now) && stored.value == value);
        Ok(removed.is_some())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        let injected = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unreachable {
                store: self.id.clone(),
                reason: "connection reset".to_string(),
            });
        }
        let now = Instant::now();

        if let Some(stored) = self.entries.get(key) {
            if !stored.is_expired(now) {
                return Ok(Some(stored.value.clone()));
            }
            drop(stored);
            self.entries.remove_if(key, |_, stored| stored.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_respects_existing_key() {
        let store = MemoryStore::new("mem-0");
        assert!(store.set_if_absent("lock", "a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_if_absent("lock", "b", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_key_can_be_taken() {
        let store = MemoryStore::new("mem-0");
        store.set_if_absent("lock", "a", Duration::from_millis(100)).await.unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(store.get("lock").await.unwrap(), None);
        assert!(store.set_if_absent("lock", "b", Duration::from_millis(100)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_equals_checks_value() {
        let store = MemoryStore::new("mem-0");
        store.set_if_absent("lock", "a", Duration::from_secs(5)).await.unwrap();
        assert!(!store.delete_if_equals("lock", "b").await.unwrap());
        assert!(store.delete_if_equals("lock", "a").await.unwrap());
        assert!(!store.delete_if_equals("lock", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_commands() {
        let store = MemoryStore::new("mem-0");
        store.set_reachable(false);
        assert!(matches!(store.ping().await, Err(StoreError::Unreachable { .. })));
        store.set_reachable(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_reads_recover() {
        let store = MemoryStore::new("mem-0");
        store.set("k", "v").await.unwrap();
        store.fail_next_reads(2);

        assert!(matches!(store.get("k").await, Err(StoreError::Unreachable { .. })));
        assert!(matches!(store.get("k").await, Err(StoreError::Unreachable { .. })));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_write_count_tracks_plain_sets() {
        let store = MemoryStore::new("mem-0");
        store.set("k", "v").await.unwrap();
        store.set_if_absent("lock", "a", Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.write_count(), 1);
    }
}
