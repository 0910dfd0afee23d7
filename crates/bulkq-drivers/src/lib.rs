//! bulkq Drivers - Database driver implementations
//!
//! This crate bundles the concrete drivers behind cargo features and
//! exposes them through a [`DriverRegistry`] keyed by driver name.

#[cfg(feature = "mssql")]
pub use bulkq_driver_mssql as mssql;
#[cfg(feature = "sqlite")]
pub use bulkq_driver_sqlite as sqlite;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from bulkq-core
pub use bulkq_core::{
    BulkqError, ColumnMeta, Connection, ConnectionConfig, DatabaseDriver, QueryResult, Result,
    Row, StatementResult, Value,
};
