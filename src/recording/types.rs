//! Workout and session types.

use crate::storage::database::DatabaseError;
use crate::tracking::types::TrackingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A recorded workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    /// Row identifier
    pub id: i64,
    /// When the workout started
    pub started_at: DateTime<Utc>,
    /// When the workout ended (None while active)
    pub finished_at: Option<DateTime<Utc>>,
    /// Filtered distance in metres, cached on finish
    pub distance_meters: Option<f64>,
    /// Average pace in seconds per kilometre, cached on finish
    pub avg_pace_secs_per_km: Option<f64>,
    /// Mean heart rate, cached on finish
    pub avg_heart_rate: Option<f64>,
}

impl Workout {
    /// Whether the workout is still being recorded.
    pub fn is_active(&self) -> bool {
        self.finished_at.is_none()
    }

    /// Duration in seconds, if finished.
    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// State of the recording session, always derived from the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// No active workout
    #[default]
    Idle,
    /// A workout is being recorded
    Active(Workout),
}

impl SessionState {
    /// The active workout, if any.
    pub fn workout(&self) -> Option<&Workout> {
        match self {
            SessionState::Idle => None,
            SessionState::Active(workout) => Some(workout),
        }
    }
}

impl From<Option<Workout>> for SessionState {
    fn from(workout: Option<Workout>) -> Self {
        workout.map_or(SessionState::Idle, SessionState::Active)
    }
}

/// Errors from session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Location permission has not been granted
    #[error("Location permission not granted")]
    PermissionDenied,

    /// A workout is already being recorded
    #[error("Workout {0} is already active")]
    AlreadyActive(i64),

    /// No workout is being recorded
    #[error("No active workout")]
    NoActiveWorkout,

    /// Location tracking failed
    #[error("Tracking error: {0}")]
    Tracking(TrackingError),

    /// Database error
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl From<TrackingError> for SessionError {
    fn from(e: TrackingError) -> Self {
        match e {
            TrackingError::PermissionDenied => SessionError::PermissionDenied,
            other => SessionError::Tracking(other),
        }
    }
}
