//! Convenient imports for common functionality.
//!
//! ```rust
//! use sql_dispatch::prelude::*;
//! ```

pub use crate::backend::{
    BackendConnection, BackendFailure, BackendResponse, Connector, Interrupter,
};
pub use crate::error::SqlDispatchError;
pub use crate::parameters::Parameters;
pub use crate::pool::{
    ConnectionPool, ConnectionTarget, PoolConfig, PoolOptions, PoolStats, ReconnectPolicy,
    SlotState,
};
pub use crate::query::Query;
pub use crate::results::{Results, ResultsState, RowView, Status};
pub use crate::typed::{ParamList, RowTuple, SqlColumn, SqlParam};
pub use crate::types::{ColumnInfo, ColumnType, DatabaseType, RowValues};

#[cfg(feature = "postgres")]
pub use crate::postgres::{PostgresOptions, PostgresOptionsBuilder};
#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteOptions, SqliteOptionsBuilder};
