//! Configuration module for sqlgrid.
//!
//! Handles loading and managing configuration from:
//! - Default values
//! - Config file (~/.config/sqlgrid/config.toml)
//! - Environment variables

mod schema;

pub use schema::{
    Config, DisplayConfig, HistoryConfig, QueueConfig, ServerConfig, StoreConfig,
};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Returns the config directory path.
///
/// Checks `SQLGRID_CONFIG_DIR` environment variable first, then falls back
/// to the system default (~/.config/sqlgrid on Linux/macOS).
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SQLGRID_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|p| p.join("sqlgrid"))
}

/// Returns the default config file path (~/.config/sqlgrid/config.toml)
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("config.toml"))
}

/// Returns the history file path (~/.config/sqlgrid/history.json)
pub fn history_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("history.json"))
}

/// Returns the log file path (~/.config/sqlgrid/sqlgrid.log)
pub fn log_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("sqlgrid.log"))
}

/// Load configuration from the default path or return defaults
pub fn load_config() -> Result<Config> {
    if let Some(path) = config_path() {
        if path.exists() {
            return load_config_from(&path);
        }
    }
    Ok(Config::default())
}

/// Load configuration from a specific path
pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}
