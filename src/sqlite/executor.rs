use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, InterruptHandle, ffi};

use crate::backend::{BackendConnection, BackendFailure, BackendResponse, Interrupter};
use crate::types::RowValues;

use super::params::convert_params;
use super::query::run_statement;

/// VM instructions between checks of the cancellation flag.
const PROGRESS_OPS: i32 = 1_000;

/// A slot's `SQLite` connection.
///
/// rusqlite is blocking, so each statement moves the connection onto the runtime's
/// blocking pool and back; the dispatcher keeps polling other slots meanwhile.
///
/// Once interrupted, the connection refuses further statements: any running
/// statement is aborted (and rolled back) by `sqlite3_interrupt`, one that starts
/// later is stopped by the progress handler or before it is stepped at all.
pub struct SqliteConnection {
    conn: Option<Connection>,
    broken: bool,
    cancelled: Arc<AtomicBool>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteConnection {
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        conn.progress_handler(PROGRESS_OPS, Some(move || flag.load(Ordering::Acquire)));
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Self {
            conn: Some(conn),
            broken: false,
            cancelled,
            interrupt,
        }
    }
}

fn interrupted() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        ffi::Error::new(ffi::SQLITE_INTERRUPT),
        Some("statement interrupted".to_string()),
    )
}

/// Classify a rusqlite error. Failures of the database file itself break the slot;
/// anything else is a statement error.
pub(crate) fn classify(err: &rusqlite::Error) -> BackendFailure {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            let message = message.clone().unwrap_or_else(|| code.to_string());
            match code.code {
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure => BackendFailure::Connection { message },
                _ => BackendFailure::Statement {
                    code: code.extended_code.to_string(),
                    message,
                },
            }
        }
        other => BackendFailure::Statement {
            code: "client".to_string(),
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl BackendConnection for SqliteConnection {
    async fn execute(
        &mut self,
        statement: &str,
        params: &[RowValues],
    ) -> Result<BackendResponse, BackendFailure> {
        let Some(conn) = self.conn.take() else {
            return Err(BackendFailure::Connection {
                message: "sqlite connection lost".to_string(),
            });
        };
        let sql = statement.to_owned();
        let values = convert_params(params);
        let cancelled = Arc::clone(&self.cancelled);

        let joined = tokio::task::spawn_blocking(move || {
            let outcome = if cancelled.load(Ordering::Acquire) {
                Err(interrupted())
            } else {
                run_statement(&conn, &sql, &values)
            };
            (conn, outcome)
        })
        .await;

        match joined {
            Ok((conn, outcome)) => {
                self.conn = Some(conn);
                outcome.map_err(|err| {
                    let failure = classify(&err);
                    if failure.is_connection() {
                        self.broken = true;
                    }
                    failure
                })
            }
            Err(join_err) => {
                self.broken = true;
                Err(BackendFailure::Connection {
                    message: format!("sqlite execution task failed: {join_err}"),
                })
            }
        }
    }

    fn is_broken(&self) -> bool {
        self.broken || self.conn.is_none() || self.cancelled.load(Ordering::Acquire)
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let cancelled = Arc::clone(&self.cancelled);
        let handle = Arc::clone(&self.interrupt);
        Some(Box::new(move || {
            cancelled.store(true, Ordering::Release);
            handle.interrupt();
        }))
    }
}
