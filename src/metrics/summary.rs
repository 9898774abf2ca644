//! Workout aggregates and the live/detail views built on them.

use crate::metrics::distance::track_distance;
use crate::metrics::pace::{windowed_pace, CURRENT_PACE_WINDOW_M, KILOMETRE_PACE_WINDOW_M};
use crate::metrics::splits::{kilometre_splits, Split};
use crate::recording::types::Workout;
use crate::sensors::types::PulseSample;
use crate::tracking::types::PositionSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregates cached on a workout row when it is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSummary {
    /// Total filtered distance in metres
    pub distance_meters: f64,
    /// Average pace in seconds per kilometre
    pub avg_pace_secs_per_km: Option<f64>,
    /// Mean of all heart-rate samples
    pub avg_heart_rate: Option<f64>,
}

impl WorkoutSummary {
    /// Compute aggregates from a filtered track and the workout's pulse samples.
    ///
    /// Average pace is wall-clock duration over distance, so pauses count.
    pub fn compute(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        positions: &[PositionSample],
        pulses: &[PulseSample],
    ) -> Self {
        let distance_meters = track_distance(positions);
        let duration_secs = (finished_at - started_at).num_milliseconds() as f64 / 1000.0;

        let avg_pace_secs_per_km = if distance_meters > 0.0 {
            Some(duration_secs / (distance_meters / 1000.0))
        } else {
            None
        };

        Self {
            distance_meters,
            avg_pace_secs_per_km,
            avg_heart_rate: mean_bpm(pulses),
        }
    }

    /// Summary cached on a finished workout row, if present.
    pub fn from_workout(workout: &Workout) -> Option<Self> {
        workout.finished_at?;
        Some(Self {
            distance_meters: workout.distance_meters.unwrap_or(0.0),
            avg_pace_secs_per_km: workout.avg_pace_secs_per_km,
            avg_heart_rate: workout.avg_heart_rate,
        })
    }
}

/// Statistics shown while a workout is running.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveStats {
    /// Workout these stats belong to
    pub workout_id: i64,
    /// Seconds since the workout started
    pub elapsed_secs: f64,
    /// Filtered distance so far
    pub distance_meters: f64,
    /// Pace over the last 100 m
    pub current_pace_secs_per_km: Option<f64>,
    /// Pace over the last kilometre
    pub kilometre_pace_secs_per_km: Option<f64>,
    /// Most recent heart-rate sample
    pub last_heart_rate: Option<u16>,
    /// Mean of all heart-rate samples so far
    pub avg_heart_rate: Option<f64>,
    /// Splits completed so far
    pub splits: Vec<Split>,
}

impl LiveStats {
    pub fn compute(
        workout_id: i64,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
        positions: &[PositionSample],
        pulses: &[PulseSample],
    ) -> Self {
        Self {
            workout_id,
            elapsed_secs: ((now - started_at).num_milliseconds() as f64 / 1000.0).max(0.0),
            distance_meters: track_distance(positions),
            current_pace_secs_per_km: windowed_pace(positions, CURRENT_PACE_WINDOW_M),
            kilometre_pace_secs_per_km: windowed_pace(positions, KILOMETRE_PACE_WINDOW_M),
            last_heart_rate: pulses.last().map(|p| p.bpm),
            avg_heart_rate: mean_bpm(pulses),
            splits: kilometre_splits(positions, pulses),
        }
    }
}

/// Everything shown for a single workout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutDetail {
    pub workout: Workout,
    /// Cached aggregates for finished workouts, computed on the fly otherwise
    pub summary: WorkoutSummary,
    pub splits: Vec<Split>,
    /// Stored GPS fixes, before filtering
    pub position_count: usize,
    /// GPS fixes that passed the reliability filter
    pub reliable_position_count: usize,
    pub pulse_count: usize,
}

impl WorkoutDetail {
    /// Build the detail view. `reliable` must already be filtered.
    pub fn build(
        workout: Workout,
        position_count: usize,
        reliable: &[PositionSample],
        pulses: &[PulseSample],
        now: DateTime<Utc>,
    ) -> Self {
        let summary = WorkoutSummary::from_workout(&workout).unwrap_or_else(|| {
            WorkoutSummary::compute(workout.started_at, now, reliable, pulses)
        });

        Self {
            summary,
            splits: kilometre_splits(reliable, pulses),
            position_count,
            reliable_position_count: reliable.len(),
            pulse_count: pulses.len(),
            workout,
        }
    }
}

fn mean_bpm(pulses: &[PulseSample]) -> Option<f64> {
    if pulses.is_empty() {
        return None;
    }
    let sum: u64 = pulses.iter().map(|p| u64::from(p.bpm)).sum();
    Some(sum as f64 / pulses.len() as f64)
}
