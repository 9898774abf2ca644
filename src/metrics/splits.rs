//! Per-kilometre splits.
//!
//! Boundaries come from cumulative filtered distance. A trailing partial
//! kilometre is reported when it covers at least [`MIN_TRAILING_SPLIT_M`];
//! the live view and the workout detail view use the same rule.

use crate::metrics::distance::{sample_distance, DISTANCE_EPSILON_M};
use crate::sensors::types::PulseSample;
use crate::tracking::types::PositionSample;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Length of one split.
pub const SPLIT_DISTANCE_M: f64 = 1000.0;

/// Shortest trailing partial split that is reported.
pub const MIN_TRAILING_SPLIT_M: f64 = 50.0;

/// Time (and mean heart rate) for one kilometre of filtered distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Split {
    /// 1-based split number
    pub number: u32,
    /// Distance covered in this split
    pub distance_meters: f64,
    /// Elapsed time since the previous boundary in seconds
    pub duration_secs: f64,
    /// Mean BPM of pulse samples inside the split's time window
    pub avg_heart_rate: Option<f64>,
    /// Whether this is a trailing split shorter than a kilometre
    pub partial: bool,
}

impl Split {
    /// Pace of this split in seconds per kilometre.
    pub fn pace_secs_per_km(&self) -> Option<f64> {
        if self.distance_meters <= 0.0 {
            return None;
        }
        Some(self.duration_secs / self.distance_meters * 1000.0)
    }
}

/// Forward-only mean over pulse samples in successive time windows.
struct PulseCursor<'a> {
    pulses: &'a [PulseSample],
    next: usize,
}

impl<'a> PulseCursor<'a> {
    fn new(pulses: &'a [PulseSample]) -> Self {
        Self { pulses, next: 0 }
    }

    /// Mean BPM of pulses in `[start, end)`, or `[start, end]` when `inclusive_end`.
    fn mean_until(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        inclusive_end: bool,
    ) -> Option<f64> {
        let mut sum = 0u64;
        let mut count = 0u64;

        while let Some(pulse) = self.pulses.get(self.next) {
            let inside_end = if inclusive_end {
                pulse.timestamp <= end
            } else {
                pulse.timestamp < end
            };
            if !inside_end {
                break;
            }
            if pulse.timestamp >= start {
                sum += u64::from(pulse.bpm);
                count += 1;
            }
            self.next += 1;
        }

        (count > 0).then(|| sum as f64 / count as f64)
    }
}

/// Compute per-kilometre splits of a filtered track.
///
/// `pulses` must be ordered by timestamp.
pub fn kilometre_splits(positions: &[PositionSample], pulses: &[PulseSample]) -> Vec<Split> {
    let mut splits = Vec::new();
    let Some(first) = positions.first() else {
        return splits;
    };

    let mut cursor = PulseCursor::new(pulses);
    let mut cumulative = 0.0;
    let mut boundary_distance = 0.0;
    let mut boundary_time = first.timestamp;
    let mut next_boundary = SPLIT_DISTANCE_M;

    for pair in positions.windows(2) {
        cumulative += sample_distance(&pair[0], &pair[1]);

        if cumulative + DISTANCE_EPSILON_M >= next_boundary {
            let at = pair[1].timestamp;
            splits.push(Split {
                number: splits.len() as u32 + 1,
                distance_meters: cumulative - boundary_distance,
                duration_secs: seconds_between(boundary_time, at),
                avg_heart_rate: cursor.mean_until(boundary_time, at, false),
                partial: false,
            });

            boundary_distance = cumulative;
            boundary_time = at;
            while next_boundary <= cumulative + DISTANCE_EPSILON_M {
                next_boundary += SPLIT_DISTANCE_M;
            }
        }
    }

    let remaining = cumulative - boundary_distance;
    if remaining >= MIN_TRAILING_SPLIT_M {
        if let Some(last) = positions.last() {
            splits.push(Split {
                number: splits.len() as u32 + 1,
                distance_meters: remaining,
                duration_secs: seconds_between(boundary_time, last.timestamp),
                avg_heart_rate: cursor.mean_until(boundary_time, last.timestamp, true),
                partial: true,
            });
        }
    }

    splits
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}
