//! Application configuration loaded from TOML.
//!
//! Runtime settings that other processes need (backup credentials, paired
//! heart-rate monitor) live in the database instead; see
//! [`crate::storage::settings`].

use crate::backup::service::BackupConfig;
use crate::metrics::filter::FilterConfig;
use crate::sensors::types::HeartRateConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Storage settings
    pub storage: StorageSettings,
    /// Heart-rate link settings
    pub heart_rate: HeartRateSettings,
    /// GPS reliability filter settings
    pub filter: FilterSettings,
    /// Backup settings
    pub backup: BackupSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            storage: StorageSettings::default(),
            heart_rate: HeartRateSettings::default(),
            filter: FilterSettings::default(),
            backup: BackupSettings::default(),
        }
    }
}

impl AppConfig {
    /// Path of the workout database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage.database_file)
    }

    /// Heart-rate manager configuration.
    pub fn heart_rate_config(&self) -> HeartRateConfig {
        HeartRateConfig {
            reconnect_interval: Duration::from_secs(self.heart_rate.reconnect_interval_secs),
            max_reconnect_attempts: self.heart_rate.max_reconnect_attempts,
            connection_timeout: Duration::from_secs(self.heart_rate.connection_timeout_secs),
        }
    }

    /// Reliability filter configuration.
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            max_accuracy_meters: self.filter.max_accuracy_meters,
            max_speed_mps: self.filter.max_speed_mps,
        }
    }

    /// Backup procedure configuration.
    pub fn backup_config(&self) -> BackupConfig {
        let local_dir = self
            .backup
            .directory
            .clone()
            .unwrap_or_else(|| self.data_dir.join("backups"));

        BackupConfig {
            local_dir,
            scratch_dir: self.data_dir.join("tmp"),
            retention: self.backup.retention,
            file_prefix: self.backup.file_prefix.clone(),
            extension: "sqlite".to_string(),
        }
    }
}

/// Storage-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Database file name inside the data directory
    pub database_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_file: "paceline.sqlite".to_string(),
        }
    }
}

/// Heart-rate link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartRateSettings {
    /// Delay between reconnection attempts in seconds
    pub reconnect_interval_secs: u64,
    /// Maximum reconnection attempts after a link drop
    pub max_reconnect_attempts: u32,
    /// Timeout for a connection attempt in seconds
    pub connection_timeout_secs: u64,
}

impl Default for HeartRateSettings {
    fn default() -> Self {
        Self {
            reconnect_interval_secs: 10,
            max_reconnect_attempts: 30,
            connection_timeout_secs: 15,
        }
    }
}

/// GPS reliability filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Fixes with a horizontal error at or above this are rejected
    pub max_accuracy_meters: f64,
    /// Implied speeds above this are rejected as teleports
    pub max_speed_mps: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        let defaults = FilterConfig::default();
        Self {
            max_accuracy_meters: defaults.max_accuracy_meters,
            max_speed_mps: defaults.max_speed_mps,
        }
    }
}

/// Backup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Local retention directory (defaults to `<data_dir>/backups`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Number of local snapshots to keep
    pub retention: usize,
    /// Snapshot file name prefix
    pub file_prefix: String,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            directory: None,
            retention: 10,
            file_prefix: "paceline".to_string(),
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "paceline", "Paceline")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load configuration from `path`, using defaults if the file does not exist.
pub fn load_config_from(path: &Path, data_dir: PathBuf) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig {
            data_dir,
            ..Default::default()
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = data_dir;

    Ok(config)
}

/// Save application configuration to `path`.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
