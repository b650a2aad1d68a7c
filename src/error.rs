use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "postgres")]
use tokio_postgres;

#[derive(Debug, Error)]
pub enum SqlDispatchError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// An operation was invoked in a lifecycle state that does not permit it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The pool has no usable connection yet; the caller may retry.
    #[error("Pool not ready: {0}")]
    NotReady(String),

    #[error("Row index {index} out of range ({rows} rows)")]
    RowOutOfRange { index: usize, rows: usize },

    #[error("Other database error: {0}")]
    Other(String),
}

impl SqlDispatchError {
    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        SqlDispatchError::InvalidState(message.into())
    }
}
