//! Scripted backend used to drive the dispatcher without a database.
//!
//! Statement text selects the behaviour:
//! - `HANG` never completes
//! - `BREAK` fails with a lost connection after a short delay
//! - `FAIL` fails with a statement error
//! - `SELECT n` returns one `Int` column holding the first parameter (or 1)
//! - anything else is a command affecting one row

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sql_dispatch::prelude::*;

#[derive(Default)]
pub struct Script {
    /// Upcoming connection attempts that fail.
    pub connect_failures: AtomicUsize,
    pub connect_attempts: AtomicUsize,
    pub connects: AtomicUsize,
    pub connect_delay: Mutex<Duration>,
    pub execute_delay: Mutex<Duration>,
    pub executed: Mutex<Vec<String>>,
}

impl Script {
    pub fn fail_connects(&self, count: usize) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    pub script: Arc<Script>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>, SqlDispatchError> {
        self.script.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.script.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .script
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SqlDispatchError::ConnectionError(
                "scripted connect failure".to_string(),
            ));
        }
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
        }))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

struct ScriptedConnection {
    script: Arc<Script>,
}

#[async_trait]
impl BackendConnection for ScriptedConnection {
    async fn execute(
        &mut self,
        statement: &str,
        params: &[RowValues],
    ) -> Result<BackendResponse, BackendFailure> {
        self.script
            .executed
            .lock()
            .unwrap()
            .push(statement.to_string());
        let delay = *self.script.execute_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match statement {
            "HANG" => std::future::pending().await,
            "BREAK" => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(BackendFailure::Connection {
                    message: "scripted connection reset".to_string(),
                })
            }
            "FAIL" => Err(BackendFailure::Statement {
                code: "42000".to_string(),
                message: "scripted statement failure".to_string(),
            }),
            "SELECT n" => {
                let value = params.first().cloned().unwrap_or(RowValues::Int(1));
                Ok(BackendResponse {
                    columns: vec![ColumnInfo::new("n", ColumnType::Int)],
                    rows: vec![vec![value]],
                    affected_rows: 1,
                })
            }
            _ => Ok(BackendResponse::command(1)),
        }
    }
}

/// Start `pool` against `connector` with short timings and wait for a slot.
pub async fn start_scripted(
    pool: &ConnectionPool,
    connector: &ScriptedConnector,
    options: PoolOptions,
) -> Result<(), SqlDispatchError> {
    pool.start_with(options, connector.shared())?;
    if pool.wait_ready(Duration::from_secs(5)).await {
        Ok(())
    } else {
        Err(SqlDispatchError::NotReady("scripted pool never became ready".to_string()))
    }
}

pub fn fast_options(slots: usize) -> PoolOptions {
    PoolOptions::new(slots)
        .poll_interval(Duration::from_millis(10))
        .drain_timeout(Duration::from_secs(5))
        .reconnect(ReconnectPolicy {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            max_attempts: None,
        })
}
