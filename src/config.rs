//! Panel configuration.
//!
//! Stored as TOML at `~/.config/carboncat/config.toml` (or the XDG
//! equivalent). Every key is optional.
//!
//! # Example Configuration
//!
//! ```toml
//! table = "otel_logs_cc"
//! row_limit = 5000
//! trace_url = "https://tempo.example.com/trace/{{ traceID }}"
//!
//! [[data_sources]]
//! id = "datasource-clickhouse-apps"
//! label = "App Logs"
//! ```
//!
//! `CARBONCAT_TABLE`, `CARBONCAT_ROW_LIMIT`, `CARBONCAT_CHUNK_SIZE` and
//! `CARBONCAT_STATE_DIR` override the file; `CARBONCAT_CONFIG` points at a
//! different file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::persist::storage::StorageKeys;
use crate::query::builder::{DEFAULT_ROW_LIMIT, LogSchema};
use crate::retrieval::StreamConfig;
use crate::retrieval::stream::{DEFAULT_CHUNK_PAUSE, DEFAULT_CHUNK_SIZE};

/// Errors that can occur when loading or saving the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

/// One selectable data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub label: String,
}

impl DataSource {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

fn default_data_sources() -> Vec<DataSource> {
    vec![
        DataSource::new("datasource-clickhouse-apps", "App Logs"),
        DataSource::new("datasource-clickhouse-platform", "Platform Logs"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Table read by the log, histogram and detail queries.
    pub table: String,
    /// Table read by label discovery.
    pub label_table: String,
    pub row_limit: usize,
    pub chunk_size: usize,
    pub chunk_pause_ms: u64,
    pub search_debounce_ms: u64,
    pub notification_ttl_ms: u64,
    pub storage_prefix: String,
    /// Directory of the file-backed store. Platform data dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Trace viewer link template, `{{ traceID }}` is substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_url: Option<String>,
    pub data_sources: Vec<DataSource>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        let schema = LogSchema::default();
        Self {
            table: schema.table,
            label_table: schema.label_table,
            row_limit: DEFAULT_ROW_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_pause_ms: DEFAULT_CHUNK_PAUSE.as_millis() as u64,
            search_debounce_ms: 500,
            notification_ttl_ms: 3000,
            storage_prefix: "carboncat.".to_string(),
            state_dir: None,
            trace_url: None,
            data_sources: default_data_sources(),
        }
    }
}

impl PanelConfig {
    /// Load from the default location, then apply environment overrides.
    ///
    /// Returns the defaults if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific path, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Configuration file path.
    ///
    /// `CARBONCAT_CONFIG` wins, then `$XDG_CONFIG_HOME/carboncat/config.toml`,
    /// then the platform config dir.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(explicit) = dotenvy::var("CARBONCAT_CONFIG") {
            return Ok(PathBuf::from(explicit));
        }
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join("carboncat").join("config.toml"));
        }
        directories::ProjectDirs::from("com", "carboncat", "carboncat")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(table) = dotenvy::var("CARBONCAT_TABLE") {
            self.table = table;
        }
        if let Ok(raw) = dotenvy::var("CARBONCAT_ROW_LIMIT") {
            self.row_limit = parse_env_number("CARBONCAT_ROW_LIMIT", &raw)?;
        }
        if let Ok(raw) = dotenvy::var("CARBONCAT_CHUNK_SIZE") {
            self.chunk_size = parse_env_number("CARBONCAT_CHUNK_SIZE", &raw)?;
        }
        if let Ok(dir) = dotenvy::var("CARBONCAT_STATE_DIR") {
            self.state_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.trim().is_empty() || self.label_table.trim().is_empty() {
            return Err(ConfigError::Validation("Table names cannot be empty".into()));
        }
        if self.row_limit == 0 {
            return Err(ConfigError::Validation("row_limit must be positive".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Validation("chunk_size must be positive".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for ds in &self.data_sources {
            if !seen.insert(ds.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate data source id: {}",
                    ds.id
                )));
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> LogSchema {
        LogSchema::new(&self.table, &self.label_table)
    }

    pub fn stream(&self) -> StreamConfig {
        StreamConfig {
            chunk_size: self.chunk_size,
            pause: Duration::from_millis(self.chunk_pause_ms),
        }
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }

    pub fn storage_keys(&self) -> StorageKeys {
        StorageKeys::with_prefix(&self.storage_prefix)
    }

    /// Data source selected for a fresh session.
    pub fn default_data_source(&self) -> &str {
        self.data_sources
            .first()
            .map(|ds| ds.id.as_str())
            .unwrap_or(crate::model::types::DEFAULT_DATA_SOURCE)
    }

    /// Directory of the file-backed store.
    pub fn state_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("com", "carboncat", "carboncat")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Path of the file-backed store document.
    pub fn state_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.state_dir()?.join("state.json"))
    }
}

fn parse_env_number(name: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim().parse().map_err(|_| {
        warn!(var = name, value = raw, "invalid numeric override");
        ConfigError::Validation(format!("{name} must be a positive integer, got '{raw}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let c = PanelConfig::default();
        assert_eq!(c.table, "otel_logs_cc");
        assert_eq!(c.label_table, "otel_logs");
        assert_eq!(c.row_limit, 20_000);
        assert_eq!(c.chunk_size, 500);
        assert_eq!(c.default_data_source(), "datasource-clickhouse-apps");
        assert_eq!(c.data_sources.len(), 2);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let c = PanelConfig::load_from(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(c, PanelConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "table = \"logs\"\nrow_limit = 100\n").unwrap();
        let c = PanelConfig::load_from(&path).unwrap();
        assert_eq!(c.table, "logs");
        assert_eq!(c.row_limit, 100);
        assert_eq!(c.chunk_size, 500);
    }

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut c = PanelConfig::default();
        c.trace_url = Some("https://t/{{ traceID }}".into());
        c.save_to(&path).unwrap();
        assert_eq!(PanelConfig::load_from(&path).unwrap(), c);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "chunk_size = 0\n").unwrap();
        assert!(matches!(PanelConfig::load_from(&path), Err(ConfigError::Validation(_))));

        std::fs::write(&path, "row_limit = \"many\"\n").unwrap();
        assert!(matches!(PanelConfig::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn duplicate_data_sources_are_rejected() {
        let mut c = PanelConfig::default();
        c.data_sources.push(DataSource::new("datasource-clickhouse-apps", "again"));
        assert!(c.validate().is_err());
    }
}
