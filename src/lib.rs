//! Asynchronous SQL query dispatch over a bounded pool of backend connections.
//!
//! Callers describe a statement as a [`Query`] carrying its [`Parameters`], a shared
//! [`Results`] sink and an optional completion hook, then hand it to
//! [`ConnectionPool::queue`] from any thread. One dispatcher thread feeds queued
//! queries, in submission order, to whichever connection slot is idle, fills in the
//! results and fires the hook.
//!
//! Both Postgres (`postgres` feature) and `SQLite` (`sqlite` feature) are supported
//! behind the [`Connector`] seam.

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
compile_error!("enable at least one backend feature: `postgres` or `sqlite`");

pub mod backend;
pub mod error;
pub mod parameters;
pub mod pool;
pub mod prelude;
pub mod query;
pub mod results;
pub mod typed;
pub mod types;

mod helpers;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "test-utils-postgres")]
pub mod test_utils;

pub use backend::{BackendConnection, BackendFailure, BackendResponse, Connector, Interrupter};
pub use error::SqlDispatchError;
pub use parameters::Parameters;
pub use pool::{
    ConnectionPool, ConnectionTarget, PoolConfig, PoolOptions, PoolStats, ReconnectPolicy,
    SlotState,
};
pub use query::{CompletionHook, Query};
pub use results::{Completion, Results, ResultsState, RowView, Status};
pub use typed::{ParamList, RowTuple, SqlColumn, SqlParam};
pub use types::{ColumnInfo, ColumnType, DatabaseType, RowValues};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConnector, PostgresOptions, PostgresOptionsBuilder};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnector, SqliteOptions, SqliteOptionsBuilder};
