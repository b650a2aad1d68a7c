// SQLite backend for the dispatcher
//
// - config: options and the `Connector` that opens slots
// - params: binding `RowValues` as rusqlite values
// - query: column typing and row extraction
// - executor: the `BackendConnection` a slot drives

pub mod config;
pub mod executor;
pub mod params;
pub mod query;

pub use config::{SqliteConnector, SqliteOptions, SqliteOptionsBuilder};
pub use executor::SqliteConnection;
pub use query::{column_type_for_decl, run_statement};
