//! Worker configuration.

use std::time::Duration;

use adlock_common::{constants, WorkerId};
use adlock_store::StoreConfig;

/// Quorum lock configuration.
#[derive(Debug, Clone)]
pub struct QuorumConfig {
    /// Fraction of the TTL reserved for clock drift between instances.
    pub drift_factor: f64,
    /// Fixed drift allowance added on top of the drift factor.
    pub clock_drift: Duration,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Upper bound of the random delay added to `retry_delay`.
    pub retry_jitter: Duration,
    /// Timeout for a single instance during acquire/release.
    pub instance_timeout: Duration,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            drift_factor: 0.01,
            clock_drift: constants::CLOCK_DRIFT_ESTIMATE,
            max_retries: 10,
            retry_delay: Duration::from_millis(200),
            retry_jitter: Duration::from_millis(200),
            instance_timeout: Duration::from_millis(200),
        }
    }
}

impl QuorumConfig {
    /// Total acquisition attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Main worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker identity (1-based).
    pub worker_id: WorkerId,
    /// HTTP listen address.
    pub http_host: String,
    /// Base HTTP port; the worker listens on `base_port + worker_id`.
    pub base_port: u16,
    /// Store instances backing the quorum.
    pub store: StoreConfig,
    /// Quorum lock configuration.
    pub quorum: QuorumConfig,
    /// TTL for the `cache` lock.
    pub cache_lock_ttl: Duration,
    /// TTL for the `warmup` lock.
    pub warmup_lock_ttl: Duration,
    /// Attempts at reading the warm-up marker before re-initializing.
    pub warmup_check_attempts: u32,
    /// Backoff step between warm-up check attempts.
    pub warmup_check_backoff: Duration,
    /// How long shutdown waits for in-flight locked work.
    pub shutdown_grace: Duration,
    /// Log level.
    pub log_level: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: WorkerId::new(1),
            http_host: "0.0.0.0".to_string(),
            base_port: 3000,
            store: StoreConfig::default(),
            quorum: QuorumConfig::default(),
            cache_lock_ttl: constants::CACHE_LOCK_TTL,
            warmup_lock_ttl: constants::WARMUP_LOCK_TTL,
            warmup_check_attempts: 3,
            warmup_check_backoff: Duration::from_millis(50),
            shutdown_grace: Duration::from_secs(10),
            log_level: "info".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.store = StoreConfig::from_env();

        if let Some(id) = env_parse::<u32>("WORKER_ID") {
            config.worker_id = WorkerId::new(id);
        }

        if let Ok(host) = std::env::var("HTTP_HOST") {
            config.http_host = host;
        }

        if let Some(port) = env_parse("HTTP_PORT") {
            config.base_port = port;
        }

        if let Some(factor) = env_parse("LOCK_DRIFT_FACTOR") {
            config.quorum.drift_factor = factor;
        }

        if let Some(retries) = env_parse("LOCK_RETRY_COUNT") {
            config.quorum.max_retries = retries;
        }

        if let Some(ms) = env_parse("LOCK_RETRY_DELAY_MS") {
            config.quorum.retry_delay = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse("LOCK_RETRY_JITTER_MS") {
            config.quorum.retry_jitter = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse("SHUTDOWN_GRACE_MS") {
            config.shutdown_grace = Duration::from_millis(ms);
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Port this worker listens on.
    pub fn http_port(&self) -> Result<u16, String> {
        u16::try_from(self.worker_id.get())
            .ok()
            .and_then(|id| self.base_port.checked_add(id))
            .ok_or_else(|| {
                format!(
                    "Port {} + worker {} exceeds 65535",
                    self.base_port, self.worker_id
                )
            })
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.worker_id.is_valid() {
            return Err("Worker ID must be at least 1".to_string());
        }

        self.http_port()?;
        self.store.validate()?;

        if !(0.0..1.0).contains(&self.quorum.drift_factor) {
            return Err("Drift factor must be in [0, 1)".to_string());
        }

        if self.cache_lock_ttl.is_zero() || self.warmup_lock_ttl.is_zero() {
            return Err("Lock TTL cannot be zero".to_string());
        }

        if self.warmup_check_attempts == 0 {
            return Err("Warm-up check attempts cannot be zero".to_string());
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
