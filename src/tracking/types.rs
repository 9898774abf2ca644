//! Positional tracking types.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One raw fix delivered by the location subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// When the fix was taken
    pub timestamp: DateTime<Utc>,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Reported ground speed in m/s
    #[serde(default, alias = "speed")]
    pub speed_mps: Option<f64>,
    /// Reported horizontal error estimate in metres (absent means untrusted)
    #[serde(default, alias = "accuracy")]
    pub accuracy_meters: Option<f64>,
}

impl PositionFix {
    /// Whether the coordinates are finite and on the globe.
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A stored GPS fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Row identifier
    pub id: i64,
    /// Owning workout
    pub workout_id: i64,
    /// When the fix was taken
    pub timestamp: DateTime<Utc>,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Reported ground speed in m/s
    pub speed_mps: Option<f64>,
    /// Reported horizontal error estimate in metres
    pub accuracy_meters: Option<f64>,
}

/// Platform permission for location updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// The user has not been asked yet
    #[default]
    Undetermined,
    /// Location updates are allowed
    Granted,
    /// The user refused location updates
    Denied,
}

/// Outcome of ingesting one batch of fixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Workout the fixes were attributed to
    pub workout_id: Option<i64>,
    /// Fixes written to the store
    pub inserted: usize,
    /// Fixes dropped because no workout was active
    pub dropped: usize,
    /// Fixes rejected as malformed or that failed to insert
    pub failed: usize,
}

/// Errors that can occur in positional tracking.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Location permission has not been granted
    #[error("Location permission not granted")]
    PermissionDenied,

    /// The location source failed to start or stop
    #[error("Location source failed: {0}")]
    SourceFailed(String),
}
