use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendConnection, Connector};
use crate::error::SqlDispatchError;
use crate::types::DatabaseType;

use super::executor::SqliteConnection;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const PRIVATE_MEMORY_PATH: &str = ":memory:";

static MEMORY_DB_SEQ: AtomicUsize = AtomicUsize::new(0);

/// A named shared-cache in-memory database, unique to one connector, so every slot
/// of a pool opens the same database.
fn shared_memory_path() -> String {
    let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "file:sql-dispatch-mem-{}-{seq}?mode=memory&cache=shared",
        std::process::id()
    )
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_wal() -> bool {
    true
}

/// Options for `SQLite` slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteOptions {
    pub db_path: String,
    /// How long a statement waits on a locked database before failing with `SQLITE_BUSY`.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Switch file databases to WAL so readers on other slots are not blocked by writers.
    #[serde(default = "default_wal")]
    pub wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            wal: true,
        }
    }

    fn is_memory(&self) -> bool {
        self.db_path == ":memory:" || self.db_path.contains("mode=memory") || self.db_path.starts_with("file::memory:")
    }

    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` for an empty path.
    pub fn validate(&self) -> Result<(), SqlDispatchError> {
        if self.db_path.trim().is_empty() {
            return Err(SqlDispatchError::ConfigError(
                "db_path is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.opts.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }
}

/// Opens `SQLite` connections for pool slots.
pub struct SqliteConnector {
    opts: SqliteOptions,
}

impl SqliteConnector {
    /// A plain `:memory:` path would give each slot a private database; it is
    /// replaced by a shared-cache in-memory database owned by this connector.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` if the options are invalid.
    pub fn new(mut opts: SqliteOptions) -> Result<Self, SqlDispatchError> {
        opts.validate()?;
        if opts.db_path.trim() == PRIVATE_MEMORY_PATH {
            opts.db_path = shared_memory_path();
        }
        Ok(Self { opts })
    }
}

fn open_connection(opts: &SqliteOptions) -> Result<Connection, SqlDispatchError> {
    let conn = Connection::open(&opts.db_path)?;
    conn.busy_timeout(Duration::from_millis(opts.busy_timeout_ms))?;
    if opts.wal && !opts.is_memory() {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    Ok(conn)
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>, SqlDispatchError> {
        let opts = self.opts.clone();
        let conn = tokio::task::spawn_blocking(move || open_connection(&opts))
            .await
            .map_err(|e| {
                SqlDispatchError::ConnectionError(format!("sqlite open task failed: {e}"))
            })??;
        Ok(Box::new(SqliteConnection::new(conn)))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.opts.db_path)
    }
}
