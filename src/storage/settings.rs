//! Keys of the process-wide settings stored in the database.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A known settings key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingKey {
    /// Base URL of the remote backup endpoint
    BackupUrl,
    /// Username for the remote backup endpoint
    BackupUsername,
    /// Password for the remote backup endpoint
    BackupPassword,
    /// Identifier of the last connected heart-rate monitor
    HeartRateDeviceId,
    /// Display name of the last connected heart-rate monitor
    HeartRateDeviceName,
}

impl SettingKey {
    /// All known keys.
    pub const ALL: [SettingKey; 5] = [
        SettingKey::BackupUrl,
        SettingKey::BackupUsername,
        SettingKey::BackupPassword,
        SettingKey::HeartRateDeviceId,
        SettingKey::HeartRateDeviceName,
    ];

    /// Key as stored in the settings table.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::BackupUrl => "backup.url",
            SettingKey::BackupUsername => "backup.username",
            SettingKey::BackupPassword => "backup.password",
            SettingKey::HeartRateDeviceId => "heart_rate.device_id",
            SettingKey::HeartRateDeviceName => "heart_rate.device_name",
        }
    }

    /// Whether the value should be hidden when displayed.
    pub fn is_secret(&self) -> bool {
        matches!(self, SettingKey::BackupPassword)
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = UnknownSettingKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownSettingKey(s.to_string()))
    }
}

/// Error for a key that is not one of [`SettingKey::ALL`].
#[derive(Debug, thiserror::Error)]
#[error("Unknown setting key: {0}")]
pub struct UnknownSettingKey(pub String);
