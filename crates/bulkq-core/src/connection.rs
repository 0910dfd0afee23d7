//! Connection trait

use crate::{QueryResult, Result, StatementResult};
use async_trait::async_trait;

/// A database connection scoped to one catalog
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "mssql")
    fn driver_name(&self) -> &str;

    /// Execute a batch for its side effects, without retrieving rows
    async fn execute(&self, sql: &str) -> Result<StatementResult>;

    /// Execute a batch and materialize its first result set
    async fn query(&self, sql: &str) -> Result<QueryResult>;

    /// List the databases (catalogs) hosted by the server behind this connection
    async fn list_databases(&self) -> Result<Vec<String>> {
        Err(crate::BulkqError::NotSupported(format!(
            "listing databases is not supported by the {} driver",
            self.driver_name()
        )))
    }

    /// Close the connection, releasing its underlying resources
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
