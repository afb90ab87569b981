//! Store connection configuration.

use std::time::Duration;

/// Bounded linear-growth backoff used when (re)connecting to a store.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay added per failed attempt.
    pub step: Duration,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
    /// Maximum connection attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(50),
            max_delay: Duration::from_millis(2000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max_delay)
    }
}

/// Configuration for the store instances backing the quorum.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// One URL per independent store instance.
    pub urls: Vec<String>,
    /// Timeout applied to a single store command.
    pub command_timeout: Duration,
    /// Reconnection settings.
    pub reconnect: ReconnectPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            urls: vec!["redis://localhost:6379".to_string()],
            command_timeout: Duration::from_millis(1000),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// `REDIS_URLS` (comma-separated) takes precedence over
    /// `REDIS_HOST`/`REDIS_PORT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(urls) = std::env::var("REDIS_URLS") {
            config.urls = parse_url_list(&urls);
        } else {
            let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
            let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
            config.urls = vec![format!("redis://{}:{}", host, port)];
        }

        if let Ok(ms) = std::env::var("REDIS_COMMAND_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.command_timeout = Duration::from_millis(ms);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.urls.is_empty() {
            return Err("At least one store URL is required".to_string());
        }

        if self.command_timeout.is_zero() {
            return Err("Store command timeout cannot be zero".to_string());
        }

        if self.reconnect.max_attempts == 0 {
            return Err("Reconnect attempts cannot be zero".to_string());
        }

        Ok(())
    }
}

fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
