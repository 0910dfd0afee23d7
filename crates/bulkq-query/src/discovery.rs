//! Listing the databases of one server

use std::time::Duration;

use bulkq_core::{BulkqError, ConnectionConfig, Result};
use bulkq_drivers::DriverRegistry;

/// Connect timeout used when browsing a server
pub const DISCOVERY_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// List the databases visible on the server described by `config`.
///
/// A single, non-concurrent read. The connection is closed before returning.
#[tracing::instrument(skip_all, fields(driver = %config.driver))]
pub async fn list_databases(
    registry: &DriverRegistry,
    config: &ConnectionConfig,
) -> Result<Vec<String>> {
    let driver = registry
        .get(&config.driver)
        .ok_or_else(|| BulkqError::NotFound(format!("driver '{}'", config.driver)))?;

    let conn = tokio::time::timeout(DISCOVERY_CONNECT_TIMEOUT, driver.connect(config))
        .await
        .map_err(|_| {
            BulkqError::Timeout(format!(
                "connect timed out after {}s",
                DISCOVERY_CONNECT_TIMEOUT.as_secs()
            ))
        })??;

    let databases = conn.list_databases().await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close discovery connection");
    }

    let databases = databases?;
    tracing::debug!(count = databases.len(), "listed databases");
    Ok(databases)
}
