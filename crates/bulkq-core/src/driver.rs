//! Database driver trait definition

use crate::{Connection, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A database driver knows how to open connections from a `ConnectionConfig`
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Registry key, matched against `ConnectionConfig::driver`
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str {
        self.name()
    }

    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Open a connection. `config.database` selects the catalog.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    fn build_connection_string(&self, config: &ConnectionConfig) -> String;
}

/// Connection descriptor: where a server lives and how to authenticate to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub driver: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            host: String::new(),
            port: 0,
            database: None,
            username: None,
            password: None,
            params: HashMap::new(),
        }
    }

    pub fn new_sqlite(database_path: &str) -> Self {
        let mut config = Self::new("sqlite");
        config.database = Some(database_path.to_string());
        config
    }

    pub fn new_mssql(host: &str, port: u16, username: Option<&str>, password: Option<&str>) -> Self {
        let mut config = Self::new("mssql");
        config.host = host.to_string();
        config.port = port;
        config.username = username.map(String::from);
        config.password = password.map(String::from);
        config
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let val = value.into();
        let str_val = match val {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Same descriptor, scoped to another catalog
    pub fn with_database(&self, database: &str) -> Self {
        let mut config = self.clone();
        config.database = Some(database.to_string());
        config
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        // First check params
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        // Check known fields
        match key {
            "host" => Some(self.host.clone()).filter(|h| !h.is_empty()),
            "database" | "path" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.params
            .get(key)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_string_prefers_params() {
        let config = ConnectionConfig::new_mssql("db1", 1433, Some("sa"), None)
            .with_param("user", "override");

        assert_eq!(config.get_string("user").as_deref(), Some("override"));
        assert_eq!(config.get_string("host").as_deref(), Some("db1"));
        assert_eq!(config.get_string("password"), None);
    }

    #[test]
    fn test_with_database_keeps_server_fields() {
        let server = ConnectionConfig::new_mssql("db1", 1433, Some("sa"), Some("pw"))
            .with_param("trust_cert", true);
        let scoped = server.with_database("Sales");

        assert_eq!(scoped.database.as_deref(), Some("Sales"));
        assert_eq!(scoped.host, "db1");
        assert!(scoped.get_bool("trust_cert"));
        assert_eq!(server.database, None);
    }

    #[test]
    fn test_config_serde_skips_empty_fields() {
        let config = ConnectionConfig::new_sqlite("/tmp/a.db");
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"driver": "sqlite", "host": "", "port": 0, "database": "/tmp/a.db"})
        );
        let back: ConnectionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
