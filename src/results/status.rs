use std::fmt;

use crate::types::{ColumnInfo, RowValues};

/// Outcome of executing one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The statement completed and returns no result columns.
    CommandOk,
    /// The statement completed and produced a (possibly empty) row set.
    RowsOk,
    /// The backend rejected or failed the statement.
    Error { code: String, message: String },
    /// The connection serving the statement broke, or the pool shut down before it ran.
    ConnectionError { message: String },
}

impl Status {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Status::CommandOk | Status::RowsOk)
    }

    /// Backend error code (SQLSTATE for Postgres, extended result code for `SQLite`).
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Status::Error { code, .. } => Some(code),
            _ => None,
        }
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Status::Error { message, .. } | Status::ConnectionError { message } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::CommandOk => f.write_str("command ok"),
            Status::RowsOk => f.write_str("rows ok"),
            Status::Error { code, message } => write!(f, "error {code}: {message}"),
            Status::ConnectionError { message } => write!(f, "connection error: {message}"),
        }
    }
}

/// Everything the dispatcher hands to a result sink when a statement finishes.
#[derive(Debug, Clone)]
pub struct Completion {
    pub status: Status,
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<RowValues>>,
    pub affected_rows: usize,
}

impl Completion {
    #[must_use]
    pub fn failed(status: Status) -> Self {
        Self {
            status,
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: 0,
        }
    }

    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::failed(Status::ConnectionError {
            message: message.into(),
        })
    }
}
