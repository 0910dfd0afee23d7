//! MS SQL Server driver implementation

use crate::connection::MssqlConnection;
use async_trait::async_trait;
use bulkq_core::{Connection, ConnectionConfig, DatabaseDriver, Result};
use std::sync::Arc;

/// MS SQL Server database driver
pub struct MssqlDriver;

impl MssqlDriver {
    /// Create a new MS SQL Server driver instance
    pub fn new() -> Self {
        tracing::debug!("MS SQL Server driver initialized");
        Self
    }
}

impl Default for MssqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for MssqlDriver {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn display_name(&self) -> &'static str {
        "MS SQL Server"
    }

    fn default_port(&self) -> Option<u16> {
        Some(1433)
    }

    #[tracing::instrument(skip(self, config), fields(host = config.get_string("host").as_deref(), database = config.get_string("database").as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        tracing::debug!("connecting to MS SQL Server");
        let connection = MssqlConnection::from_config(config).await?;
        Ok(Arc::new(connection))
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 { config.port } else { 1433 };

        let mut conn_str = format!("Server={},{}", host, port);

        if let Some(db) = config.get_string("database") {
            conn_str.push_str(&format!(";Database={}", db));
        }

        if let Some(user) = config.get_string("user") {
            conn_str.push_str(&format!(";User Id={}", user));
            if let Some(p) = config.get_string("password") {
                conn_str.push_str(&format!(";Password={}", p));
            }
        } else {
            conn_str.push_str(";Trusted_Connection=True");
        }

        if config.get_bool("trust_cert") {
            conn_str.push_str(";TrustServerCertificate=True");
        }

        conn_str
    }
}
