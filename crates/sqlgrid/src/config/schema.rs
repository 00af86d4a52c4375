//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Store (database file) settings
    pub store: StoreConfig,
    /// Write queue settings
    pub queue: QueueConfig,
    /// Script endpoint settings
    pub server: ServerConfig,
    /// Display settings
    pub display: DisplayConfig,
    /// Command-line history settings
    pub history: HistoryConfig,
}

/// Settings for the read/write handle pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a handle waits on a locked database before failing
    pub busy_timeout_ms: u64,
    /// Create the database file when it does not exist
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            create_if_missing: false,
        }
    }
}

/// Settings for the batched write queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Interval between transactional flushes in milliseconds
    pub flush_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 1000,
        }
    }
}

/// Settings for the loopback command endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Start the endpoint at all
    pub enabled: bool,
    /// First port tried when binding
    pub port_start: u16,
    /// Last port tried when binding (inclusive)
    pub port_end: u16,
    /// Largest accepted request body or header block in bytes
    pub max_request_bytes: usize,
    /// Largest tabular reply in bytes; longer results are cut at a row boundary
    pub max_reply_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port_start: 8080,
            port_end: 9079,
            max_request_bytes: 4095,
            max_reply_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Display-related settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show absolute row numbers in the grid
    pub show_row_numbers: bool,
    /// Minimum column width (characters)
    pub min_column_width: u16,
    /// Maximum column width (characters)
    pub max_column_width: u16,
    /// Highlight uncleared rows by their `severity` column
    pub severity_colors: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_row_numbers: true,
            min_column_width: 3,
            max_column_width: 40,
            severity_colors: true,
        }
    }
}

/// Command-line history settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Persist history between launches
    pub persist: bool,
    /// Maximum history entries to keep
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            persist: true,
            max_entries: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[store]
busy_timeout_ms = 250
create_if_missing = true

[queue]
flush_interval_ms = 200

[server]
enabled = false
port_start = 9100
port_end = 9110
max_reply_bytes = 1024

[display]
show_row_numbers = false
max_column_width = 60

[history]
max_entries = 50
"#;

        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.store.busy_timeout_ms, 250);
        assert!(config.store.create_if_missing);
        assert_eq!(config.queue.flush_interval_ms, 200);

        assert!(!config.server.enabled);
        assert_eq!(config.server.port_start, 9100);
        assert_eq!(config.server.port_end, 9110);
        assert_eq!(config.server.max_reply_bytes, 1024);
        // Unset field keeps its default
        assert_eq!(config.server.max_request_bytes, 4095);

        assert!(!config.display.show_row_numbers);
        assert_eq!(config.display.max_column_width, 60);
        assert_eq!(config.display.min_column_width, 3);

        assert_eq!(config.history.max_entries, 50);
        assert!(config.history.persist);
    }

    #[test]
    fn test_serialize_config() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[queue]"));
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[display]"));
    }
}
