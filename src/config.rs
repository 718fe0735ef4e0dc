//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//!
//! The loaded [`StoreConfig`] is immutable and handed to the store and its
//! engines behind an `Arc`; engine code never reads configuration from the
//! environment itself.

use crate::storage::SplitFrequency;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub updater: UpdaterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store-wide storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the store
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Sharding granularity of the chunked engine
    #[serde(default, alias = "data_spilt_frequency")]
    pub split_frequency: SplitFrequency,

    /// Default origin for recomputing derived datasets
    #[serde(default = "default_data_start_date")]
    pub data_start_date: NaiveDate,

    /// Character encoding of all text files (only UTF-8 is supported)
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("pitdb"))
        .unwrap_or_else(|| PathBuf::from("./pitdb_data"))
}

/// Replace a leading `~` with the home directory
fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}

fn default_data_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default()
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            split_frequency: SplitFrequency::default(),
            data_start_date: default_data_start_date(),
            encoding: default_encoding(),
        }
    }
}

impl StoreConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    /// Builder: set sharding granularity
    pub fn split_frequency(mut self, frequency: SplitFrequency) -> Self {
        self.split_frequency = frequency;
        self
    }

    /// Builder: set default recompute origin
    pub fn data_start_date(mut self, date: NaiveDate) -> Self {
        self.data_start_date = date;
        self
    }

    /// Get path to the catalog file
    pub fn catalog_path(&self) -> PathBuf {
        self.db_path.join("catalog.json")
    }

    /// Settings recorded when the store was created
    pub fn store_record_path(&self) -> PathBuf {
        self.db_path.join("store.json")
    }

    /// Name of the root catalog node
    pub fn db_name(&self) -> String {
        self.db_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "pitdb".to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.encoding.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(()),
            other => Err(ConfigError::Invalid(format!(
                "unsupported encoding {:?}, only utf-8 is supported",
                other
            ))),
        }
    }
}

/// Update pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpdaterConfig {
    /// Hour of day after which today's data counts as complete
    #[serde(default = "default_cutover_hour")]
    pub cutover_hour: u32,

    /// Watermark file name, relative to the store root
    #[serde(default = "default_watermark_file")]
    pub watermark_file: String,
}

fn default_cutover_hour() -> u32 {
    18
}

fn default_watermark_file() -> String {
    "update_time.json".to_string()
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            cutover_hour: default_cutover_hour(),
            watermark_file: default_watermark_file(),
        }
    }
}

impl UpdaterConfig {
    pub fn watermark_path(&self, store: &StoreConfig) -> PathBuf {
        store.db_path.join(&self.watermark_file)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.store.db_path = expand_home(config.store.db_path);

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("pitdb").join("config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        if self.updater.cutover_hour > 23 {
            return Err(ConfigError::Invalid(format!(
                "cutover_hour must be within 0..=23, got {}",
                self.updater.cutover_hour
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(db_path) = std::env::var("PITDB_DB_PATH") {
            self.store.db_path = expand_home(PathBuf::from(db_path));
        }
        if let Ok(frequency) = std::env::var("PITDB_SPLIT_FREQUENCY") {
            match frequency.parse() {
                Ok(f) => self.store.split_frequency = f,
                Err(e) => tracing::warn!("Ignoring PITDB_SPLIT_FREQUENCY: {}", e),
            }
        }

        if let Ok(level) = std::env::var("PITDB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PITDB_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    let db_path = toml::Value::String(default_db_path().display().to_string());
    format!(
        r#"# pitdb Configuration
#
# Environment variables override these settings:
# - PITDB_DB_PATH
# - PITDB_SPLIT_FREQUENCY
# - PITDB_LOG_LEVEL
# - PITDB_LOG_FORMAT

[store]
# Root directory of the store
db_path = {db_path}

# Shard granularity: YEAR, MONTH or QUARTER
data_spilt_frequency = "QUARTER"

# Default origin when a derived dataset has never been updated
data_start_date = "2010-01-01"

# Encoding of all text files (only utf-8 is supported)
encoding = "utf-8"

[updater]
# Before this hour, today's data is not considered complete
cutover_hour = 18

# Watermark file, relative to db_path
watermark_file = "update_time.json"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.store.split_frequency, SplitFrequency::Quarter);
        assert_eq!(
            config.store.data_start_date,
            NaiveDate::from_ymd_opt(2010, 1, 1).unwrap()
        );
        assert_eq!(config.updater.cutover_hour, 18);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_db_path_is_resolved() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.store.db_path, default_db_path());
        assert!(!config.store.db_path.starts_with("~"));
    }

    #[test]
    fn test_home_is_expanded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store]\ndb_path = \"~/stores/pitdb\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        match dirs::home_dir() {
            Some(home) => assert_eq!(config.store.db_path, home.join("stores").join("pitdb")),
            None => assert_eq!(config.store.db_path, PathBuf::from("~/stores/pitdb")),
        }
        assert_eq!(expand_home(PathBuf::from("/srv/~db")), PathBuf::from("/srv/~db"));
    }

    #[test]
    fn test_split_frequency_names() {
        let config: Config = toml::from_str(
            r#"
            [store]
            db_path = "/tmp/db"
            split_frequency = "MONTH"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.split_frequency, SplitFrequency::Month);
        assert_eq!(config.store.db_path, PathBuf::from("/tmp/db"));
        assert_eq!(config.store.catalog_path(), PathBuf::from("/tmp/db/catalog.json"));
        assert_eq!(config.store.db_name(), "db");
    }

    #[test]
    fn test_unsupported_encoding() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store]\nencoding = \"gbk\"\n").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = Config::load(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
