//! Persisted bulkq configuration
//!
//! Server definitions, the databases selected on each server, the statement
//! timeout and system-database filtering, stored as pretty JSON.

mod settings_file;

pub use settings_file::{CONFIG_ENV_VAR, config_dir, default_settings_file, settings_file};

use anyhow::{Context, Result, bail};
use bulkq_core::{ConnectionConfig, Target};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Databases every SQL Server instance ships with
pub const SYSTEM_DATABASES: &[&str] = &["master", "model", "msdb", "tempdb"];

pub fn is_system_database(name: &str) -> bool {
    SYSTEM_DATABASES
        .iter()
        .any(|system| system.eq_ignore_ascii_case(name))
}

/// One configured server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDefinition {
    pub display_name: String,
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub selected_databases: Vec<String>,
}

impl ServerDefinition {
    pub fn new(display_name: impl Into<String>, connection: ConnectionConfig) -> Self {
        Self {
            display_name: display_name.into(),
            connection,
            selected_databases: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkqSettings {
    pub servers: Vec<ServerDefinition>,
    pub hide_system_databases: bool,
    /// Per-statement timeout; 0 disables it
    pub sql_timeout_secs: u64,
}

impl Default for BulkqSettings {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            hide_system_databases: true,
            sql_timeout_secs: 30,
        }
    }
}

impl BulkqSettings {
    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings JSON in {:?}", path))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {:?}", path))?;
        tracing::debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    pub fn settings_path() -> Result<PathBuf> {
        settings_file()
    }

    pub fn server(&self, name: &str) -> Option<&ServerDefinition> {
        self.servers.iter().find(|s| s.display_name == name)
    }

    /// Add a server; display names must be unique
    pub fn add_server(&mut self, server: ServerDefinition) -> Result<()> {
        if self.server(&server.display_name).is_some() {
            bail!("A server named '{}' already exists", server.display_name);
        }
        self.servers.push(server);
        Ok(())
    }

    /// Remove a server, returning it if it was configured
    pub fn remove_server(&mut self, name: &str) -> Option<ServerDefinition> {
        let idx = self.servers.iter().position(|s| s.display_name == name)?;
        Some(self.servers.remove(idx))
    }

    /// Replace the selected databases of `name`, keeping the given order and
    /// dropping duplicates
    pub fn select_databases(&mut self, name: &str, databases: &[String]) -> Result<()> {
        let server = self
            .servers
            .iter_mut()
            .find(|s| s.display_name == name)
            .with_context(|| format!("Unknown server '{}'", name))?;

        let mut selected: Vec<String> = Vec::with_capacity(databases.len());
        for db in databases {
            if !selected.contains(db) {
                selected.push(db.clone());
            }
        }
        server.selected_databases = selected;
        Ok(())
    }

    /// Apply system-database filtering to a database listing
    pub fn visible_databases(&self, databases: Vec<String>) -> Vec<String> {
        if !self.hide_system_databases {
            return databases;
        }
        databases
            .into_iter()
            .filter(|db| !is_system_database(db))
            .collect()
    }

    /// Expand the selected databases into targets, in server order then
    /// database order.
    ///
    /// An empty `servers` filter selects every configured server. Naming an
    /// unknown server is an error.
    pub fn targets(&self, servers: &[String]) -> Result<Vec<Target>> {
        if let Some(unknown) = servers.iter().find(|name| self.server(name).is_none()) {
            bail!("Unknown server '{}'", unknown);
        }

        let targets = self
            .servers
            .iter()
            .filter(|server| servers.is_empty() || servers.contains(&server.display_name))
            .flat_map(|server| {
                server
                    .selected_databases
                    .iter()
                    .filter(|db| !(self.hide_system_databases && is_system_database(db)))
                    .map(|db| Target::new(&server.connection, &server.display_name, db.as_str()))
            })
            .collect();

        Ok(targets)
    }
}
