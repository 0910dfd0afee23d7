//! Settings file utilities

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable overriding the settings file location
pub const CONFIG_ENV_VAR: &str = "BULKQ_CONFIG";

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .context("Could not determine config directory")
        .map(|p| p.join("bulkq"))
}

/// Default settings file, `<config_dir>/bulkq/settings.json`
pub fn default_settings_file() -> Result<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Settings file honouring `BULKQ_CONFIG`
pub fn settings_file() -> Result<PathBuf> {
    resolve_settings_file(std::env::var_os(CONFIG_ENV_VAR))
}

pub(crate) fn resolve_settings_file(override_path: Option<OsString>) -> Result<PathBuf> {
    match override_path.filter(|p| !p.is_empty()) {
        Some(path) => Ok(PathBuf::from(path)),
        None => default_settings_file(),
    }
}
