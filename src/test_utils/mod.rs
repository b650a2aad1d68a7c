//! Helpers for tests and benchmarks that need a live backend.

/// Embedded `PostgreSQL` for integration tests
pub mod postgres;

pub use postgres::*;
