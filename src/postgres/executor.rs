use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio_postgres::{Client, NoTls};
use tracing::warn;

use crate::backend::{BackendConnection, BackendFailure, BackendResponse, Interrupter};
use crate::types::RowValues;

use super::params::as_refs;
use super::query::build_response;

/// A slot's Postgres session.
pub struct PostgresConnection {
    client: Client,
}

impl PostgresConnection {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn classify(&self, err: &tokio_postgres::Error) -> BackendFailure {
        if err.is_closed() || self.client.is_closed() {
            return BackendFailure::Connection {
                message: err.to_string(),
            };
        }
        match err.as_db_error() {
            Some(db) => BackendFailure::Statement {
                code: db.code().code().to_string(),
                message: db.message().to_string(),
            },
            // Client-side failures (parameter count, encoding) never reached the server.
            None => BackendFailure::Statement {
                code: "client".to_string(),
                message: err.to_string(),
            },
        }
    }
}

#[async_trait]
impl BackendConnection for PostgresConnection {
    async fn execute(
        &mut self,
        statement: &str,
        params: &[RowValues],
    ) -> Result<BackendResponse, BackendFailure> {
        let stmt = match self.client.prepare(statement).await {
            Ok(stmt) => stmt,
            Err(err) => return Err(self.classify(&err)),
        };
        let refs = as_refs(params);

        if stmt.columns().is_empty() {
            let affected = match self.client.execute(&stmt, &refs).await {
                Ok(n) => n,
                Err(err) => return Err(self.classify(&err)),
            };
            Ok(BackendResponse::command(
                usize::try_from(affected).unwrap_or(usize::MAX),
            ))
        } else {
            let rows = match self.client.query(&stmt, &refs).await {
                Ok(rows) => rows,
                Err(err) => return Err(self.classify(&err)),
            };
            build_response(&stmt, &rows).map_err(|err| self.classify(&err))
        }
    }

    fn is_broken(&self) -> bool {
        self.client.is_closed()
    }

    /// Sends a server-side cancel request for the running statement. Needs the
    /// dispatcher's runtime to be current.
    fn interrupter(&self) -> Option<Interrupter> {
        let token = self.client.cancel_token();
        Some(Box::new(move || {
            let Ok(handle) = Handle::try_current() else {
                return;
            };
            let token = token.clone();
            handle.spawn(async move {
                if let Err(error) = token.cancel_query(NoTls).await {
                    warn!(error = %error, "postgres cancel request failed");
                }
            });
        }))
    }
}
