//! Redis-backed store client.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{RedisError, Script};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use adlock_common::StoreId;

use crate::client::{StoreClient, StoreError, StoreResult};
use crate::config::{ReconnectPolicy, StoreConfig};

/// Deletes KEYS[1] only when it still holds the caller's token.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Connection to one Redis instance.
///
/// The multiplexed connection is established lazily and dropped on any
/// connectivity failure, so the next command reconnects with backoff.
pub struct RedisStore {
    /// Instance identifier.
    id: StoreId,
    /// Redis client (holds the URL, no I/O).
    client: redis::Client,
    /// Cached connection, `None` until connected or after a failure.
    connection: Mutex<Option<MultiplexedConnection>>,
    /// Set once `close` has been called.
    closed: AtomicBool,
    /// Timeout applied to a single command.
    command_timeout: Duration,
    /// Reconnection settings.
    reconnect: ReconnectPolicy,
    /// Compare-and-delete script used for lock release.
    release_script: Script,
}

impl RedisStore {
    /// Create a client for the instance at `url`. Does not connect.
    pub fn new(id: StoreId, url: &str, config: &StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Unreachable {
            store: id.clone(),
            reason: format!("invalid url {}: {}", url, e),
        })?;

        Ok(Self {
            id,
            client,
            connection: Mutex::new(None),
            closed: AtomicBool::new(false),
            command_timeout: config.command_timeout,
            reconnect: config.reconnect.clone(),
            release_script: Script::new(COMPARE_AND_DELETE),
        })
    }

    /// Create one client per configured URL, named `redis-0`, `redis-1`, ...
    pub fn from_config(config: &StoreConfig) -> StoreResult<Vec<Self>> {
        config
            .urls
            .iter()
            .enumerate()
            .map(|(i, url)| Self::new(StoreId::new(format!("redis-{}", i)), url, config))
            .collect()
    }

    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed(self.id.clone()));
        }

        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.connect_with_backoff().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn connect_with_backoff(&self) -> StoreResult<MultiplexedConnection> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let reason = match tokio::time::timeout(
                self.command_timeout,
                self.client.get_multiplexed_async_connection(),
            )
            .await
            {
                Ok(Ok(conn)) => {
                    info!(store = %self.id, attempt, "Connected to store");
                    return Ok(conn);
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "connect timed out".to_string(),
            };

            if attempt >= self.reconnect.max_attempts {
                return Err(StoreError::Unreachable {
                    store: self.id.clone(),
                    reason,
                });
            }

            let delay = self.reconnect.delay_for(attempt);
            warn!(
                store = %self.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %reason,
                "Store connection failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn invalidate(&self) {
        self.connection.lock().await.take();
    }

    async fn execute<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.connection().await?;

        match tokio::time::timeout(self.command_timeout, op(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.classify(e).await),
            Err(_) => {
                self.invalidate().await;
                Err(StoreError::Timeout {
                    store: self.id.clone(),
                    timeout_ms: self.command_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn classify(&self, e: RedisError) -> StoreError {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            debug!(store = %self.id, error = %e, "Dropping store connection");
            self.invalidate().await;
            StoreError::Unreachable {
                store: self.id.clone(),
                reason: e.to_string(),
            }
        } else {
            StoreError::Command {
                store: self.id.clone(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl StoreClient for RedisStore {
    fn id(&self) -> &StoreId {
        &self.id
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        self.execute(|mut conn| async move {
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await?;
            Ok(reply.is_some())
        })
        .await
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> StoreResult<bool> {
        let script = &self.release_script;
        self.execute(|mut conn| async move {
            let deleted: i64 = script.key(key).arg(value).invoke_async(&mut conn).await?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.execute(|mut conn| async move {
            let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.execute(|mut conn| async move {
            let _: () = redis::cmd("SET").arg(key).arg(value).query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.execute(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        self.invalidate().await;
        info!(store = %self.id, "Store connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_names_instances() {
        let config = StoreConfig {
            urls: vec![
                "redis://127.0.0.1:6379".to_string(),
                "redis://127.0.0.1:6380".to_string(),
            ],
            ..StoreConfig::default()
        };
        let stores = RedisStore::from_config(&config).unwrap();
        let ids: Vec<_> = stores.iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["redis-0", "redis-1"]);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = RedisStore::new(StoreId::new("bad"), "not-a-url", &StoreConfig::default());
        assert!(matches!(result, Err(StoreError::Unreachable { .. })));
    }

    #[tokio::test]
    async fn test_closed_store_refuses_commands() {
        let store = RedisStore::new(
            StoreId::new("redis-0"),
            "redis://127.0.0.1:6379",
            &StoreConfig::default(),
        )
        .unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.get("k").await, Err(StoreError::Closed(_))));
    }
}
