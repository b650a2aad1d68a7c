// PostgreSQL backend for the dispatcher
//
// - config: connection options and the `Connector` that opens slots
// - params: binding `RowValues` to placeholder types
// - query: column typing and row extraction
// - executor: the `BackendConnection` a slot drives

pub mod config;
pub mod executor;
pub mod params;
pub mod query;

pub use config::{PostgresConnector, PostgresOptions, PostgresOptionsBuilder};
pub use executor::PostgresConnection;
pub use query::{build_response, column_type_for, postgres_extract_value};
