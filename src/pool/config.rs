use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::Connector;
use crate::error::SqlDispatchError;
use crate::types::DatabaseType;

#[cfg(feature = "postgres")]
use crate::postgres::{PostgresConnector, PostgresOptions};
#[cfg(feature = "sqlite")]
use crate::sqlite::{SqliteConnector, SqliteOptions};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// How failed slots are re-established.
///
/// Delays double from `initial_backoff` up to `max_backoff`. With `max_attempts` set,
/// a slot that fails that many consecutive connection attempts stays `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the retry that follows `failures` consecutive failures.
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff)
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    #[must_use]
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures < max)
    }
}

/// Tuning for a started pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of backend connections (slots).
    pub max_concurrency: usize,
    /// Upper bound on how long the dispatcher waits for readiness before re-checking
    /// its slots.
    pub poll_interval: Duration,
    /// How long `terminate()` lets queued and in-flight queries finish before
    /// resolving the rest with a connection error.
    pub drain_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl PoolOptions {
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` for a zero-sized pool or a zero poll
    /// interval.
    pub fn validate(&self) -> Result<(), SqlDispatchError> {
        if self.max_concurrency == 0 {
            return Err(SqlDispatchError::ConfigError(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SqlDispatchError::ConfigError(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The backend a pool connects its slots to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "db_type", rename_all = "lowercase")]
pub enum ConnectionTarget {
    #[cfg(feature = "postgres")]
    Postgres(PostgresOptions),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteOptions),
}

impl ConnectionTarget {
    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        match self {
            #[cfg(feature = "postgres")]
            ConnectionTarget::Postgres(_) => DatabaseType::Postgres,
            #[cfg(feature = "sqlite")]
            ConnectionTarget::Sqlite(_) => DatabaseType::Sqlite,
        }
    }

    /// Build the connector that opens slots for this target.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` if the target's options are incomplete.
    pub fn connector(&self) -> Result<Arc<dyn Connector>, SqlDispatchError> {
        match self {
            #[cfg(feature = "postgres")]
            ConnectionTarget::Postgres(opts) => Ok(Arc::new(PostgresConnector::new(opts)?)),
            #[cfg(feature = "sqlite")]
            ConnectionTarget::Sqlite(opts) => Ok(Arc::new(SqliteConnector::new(opts.clone())?)),
        }
    }
}

/// Serializable pool configuration, for embedding in a server's config file.
///
/// ```rust
/// # #[cfg(feature = "sqlite")] {
/// use sql_dispatch::prelude::*;
///
/// let cfg = PoolConfig::from_json_str(
///     r#"{"target": {"db_type": "sqlite", "db_path": "app.db"}, "max_concurrency": 4}"#,
/// )
/// .unwrap();
/// assert_eq!(cfg.options().max_concurrency, 4);
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub target: ConnectionTarget,
    pub max_concurrency: usize,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub drain_timeout_ms: Option<u64>,
    #[serde(default)]
    pub reconnect_initial_backoff_ms: Option<u64>,
    #[serde(default)]
    pub reconnect_max_backoff_ms: Option<u64>,
    #[serde(default)]
    pub reconnect_max_attempts: Option<u32>,
}

impl PoolConfig {
    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` if the JSON does not describe a pool.
    pub fn from_json_str(json: &str) -> Result<Self, SqlDispatchError> {
        serde_json::from_str(json)
            .map_err(|e| SqlDispatchError::ConfigError(format!("invalid pool config: {e}")))
    }

    #[must_use]
    pub fn options(&self) -> PoolOptions {
        let defaults = ReconnectPolicy::default();
        let mut options = PoolOptions::new(self.max_concurrency).reconnect(ReconnectPolicy {
            initial_backoff: self
                .reconnect_initial_backoff_ms
                .map_or(defaults.initial_backoff, Duration::from_millis),
            max_backoff: self
                .reconnect_max_backoff_ms
                .map_or(defaults.max_backoff, Duration::from_millis),
            max_attempts: self.reconnect_max_attempts,
        });
        if let Some(ms) = self.poll_interval_ms {
            options = options.poll_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.drain_timeout_ms {
            options = options.drain_timeout(Duration::from_millis(ms));
        }
        options
    }
}
