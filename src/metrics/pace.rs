//! Pace over a trailing distance window.

use crate::metrics::distance::{sample_distance, DISTANCE_EPSILON_M};
use crate::tracking::types::PositionSample;

/// Window for the "current pace" readout.
pub const CURRENT_PACE_WINDOW_M: f64 = 100.0;

/// Window for the per-kilometre pace readout.
pub const KILOMETRE_PACE_WINDOW_M: f64 = 1000.0;

/// Pace in seconds per kilometre over the last `window_m` metres of a track.
///
/// Walks backward from the newest sample until the window is covered. Returns
/// `None` for fewer than two samples or when the track is shorter than the
/// window.
pub fn windowed_pace(samples: &[PositionSample], window_m: f64) -> Option<f64> {
    let newest = samples.last()?;
    let mut covered = 0.0;

    for pair in samples.windows(2).rev() {
        covered += sample_distance(&pair[0], &pair[1]);

        if covered + DISTANCE_EPSILON_M >= window_m {
            let elapsed = (newest.timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1000.0;
            if covered <= 0.0 || elapsed <= 0.0 {
                return None;
            }
            return Some(elapsed / covered * 1000.0);
        }
    }

    None
}

/// Format a pace in seconds per kilometre as `m:ss`.
pub fn format_pace(secs_per_km: f64) -> String {
    if !secs_per_km.is_finite() || secs_per_km < 0.0 {
        return "--:--".to_string();
    }

    let total = secs_per_km.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
