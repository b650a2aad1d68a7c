//! The seam between the dispatcher and a concrete database driver.
//!
//! The dispatcher only ever talks to [`Connector`] and [`BackendConnection`]; the
//! Postgres and `SQLite` modules provide implementations, and tests plug in scripted
//! ones.

use async_trait::async_trait;

use crate::error::SqlDispatchError;
use crate::results::{Completion, Status};
use crate::types::{ColumnInfo, DatabaseType, RowValues};

/// Successful response to one statement.
#[derive(Debug, Clone, Default)]
pub struct BackendResponse {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<RowValues>>,
    pub affected_rows: usize,
}

impl BackendResponse {
    /// Response for a statement that returns no columns.
    #[must_use]
    pub fn command(affected_rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows,
        }
    }

    fn into_completion(self) -> Completion {
        let status = if self.columns.is_empty() {
            Status::CommandOk
        } else {
            Status::RowsOk
        };
        Completion {
            status,
            columns: self.columns,
            rows: self.rows,
            affected_rows: self.affected_rows,
        }
    }
}

/// Why a statement did not produce a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendFailure {
    /// The backend rejected the statement; the connection is still usable.
    Statement { code: String, message: String },
    /// The connection is unusable and must be re-established.
    Connection { message: String },
}

impl BackendFailure {
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, BackendFailure::Connection { .. })
    }
}

/// Translate an execution outcome into what the result sink receives.
pub(crate) fn completion_from(outcome: Result<BackendResponse, BackendFailure>) -> Completion {
    match outcome {
        Ok(response) => response.into_completion(),
        Err(BackendFailure::Statement { code, message }) => {
            Completion::failed(Status::Error { code, message })
        }
        Err(BackendFailure::Connection { message }) => Completion::connection_error(message),
    }
}

/// Aborts the statement a connection is running, callable from outside the execution.
pub type Interrupter = Box<dyn Fn() + Send + Sync>;

/// One physical backend connection, exclusively owned by a pool slot.
#[async_trait]
pub trait BackendConnection: Send {
    /// Bind `params` to the statement's positional placeholders and run it.
    async fn execute(
        &mut self,
        statement: &str,
        params: &[RowValues],
    ) -> Result<BackendResponse, BackendFailure>;

    /// Cheap liveness check run while the slot is idle.
    fn is_broken(&self) -> bool {
        false
    }

    /// Handle that aborts the in-flight statement so its effects roll back. Taken
    /// when a statement is dispatched; `None` if the backend cannot be interrupted.
    fn interrupter(&self) -> Option<Interrupter> {
        None
    }
}

/// Opens connections to one backend target.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new connection.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConnectionError` (or a driver error) when the target
    /// cannot be reached.
    async fn connect(&self) -> Result<Box<dyn BackendConnection>, SqlDispatchError>;

    fn database_type(&self) -> DatabaseType;

    /// Human-readable target for logs; must not include credentials.
    fn describe(&self) -> String;
}
