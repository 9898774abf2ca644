//! Heart-rate sensor types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Connection state of the heart-rate link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link and no scan running
    #[default]
    Disconnected,
    /// Looking for heart-rate monitors
    Scanning,
    /// Connection in progress
    Connecting,
    /// Link established and frames flowing
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Scanning => write!(f, "Scanning..."),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// A heart-rate monitor seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Link-level device identifier
    pub device_id: String,
    /// Advertised name, if any
    pub name: Option<String>,
}

impl DiscoveredDevice {
    /// Name to show for this device.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Sensor")
    }
}

/// A stored heart-rate reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseSample {
    pub id: i64,
    pub workout_id: i64,
    pub timestamp: DateTime<Utc>,
    pub bpm: u16,
}

/// Events broadcast by the heart-rate manager.
#[derive(Debug, Clone, PartialEq)]
pub enum HeartRateEvent {
    /// A new device was seen during the current scan
    Discovered(DiscoveredDevice),
    /// The connection state changed
    StateChanged(ConnectionState),
    /// A heart-rate frame was decoded
    HeartRate { bpm: u16, timestamp: DateTime<Utc> },
    /// A reconnection attempt is about to run
    Reconnecting { attempt: u32 },
    /// All reconnection attempts failed
    ReconnectAbandoned,
}

/// Configuration for the heart-rate manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRateConfig {
    /// Delay before each reconnection attempt
    pub reconnect_interval: Duration,
    /// Reconnection attempts after an unsolicited drop
    pub max_reconnect_attempts: u32,
    /// Timeout for one connection attempt
    pub connection_timeout: Duration,
}

impl Default for HeartRateConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(10),
            max_reconnect_attempts: 30,
            connection_timeout: Duration::from_secs(15),
        }
    }
}

/// Errors from the heart-rate link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// BLE adapter not found or unavailable
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Failed to start or stop scanning
    #[error("Failed to scan: {0}")]
    ScanFailed(String),

    /// No device with the given identifier is known
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Connection to the device failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection did not complete in time
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// Failed to subscribe to measurement notifications
    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    /// Operation not valid in the current connection state
    #[error("Invalid state: {0}")]
    InvalidState(ConnectionState),

    /// Generic BLE error
    #[error("BLE error: {0}")]
    BleError(String),
}
