//! GPS reliability filter.
//!
//! Applied at read time; stored samples are never modified.

use crate::metrics::distance::sample_distance;
use crate::tracking::types::PositionSample;
use serde::{Deserialize, Serialize};

/// Thresholds for rejecting unreliable fixes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Fixes whose horizontal error is missing or at least this are dropped
    pub max_accuracy_meters: f64,
    /// Fixes implying a faster move than this from the last accepted fix are dropped
    pub max_speed_mps: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_accuracy_meters: 20.0,
            // about 50 km/h
            max_speed_mps: 14.0,
        }
    }
}

impl FilterConfig {
    /// Stage 1: whether a fix reports a usable horizontal error.
    pub fn is_accurate(&self, sample: &PositionSample) -> bool {
        matches!(sample.accuracy_meters, Some(acc) if acc.is_finite() && acc < self.max_accuracy_meters)
    }

    /// Stage 2: whether moving from `previous` to `candidate` is physically plausible.
    pub fn is_plausible_move(&self, previous: &PositionSample, candidate: &PositionSample) -> bool {
        let distance = sample_distance(previous, candidate);
        let elapsed = (candidate.timestamp - previous.timestamp).num_milliseconds() as f64 / 1000.0;

        if elapsed <= 0.0 {
            // No time passed: only a fix at the same spot is believable
            return distance == 0.0;
        }

        distance / elapsed <= self.max_speed_mps
    }
}

/// Filter a time-ordered track down to its trustworthy subsequence.
pub fn filter_reliable(samples: &[PositionSample], config: &FilterConfig) -> Vec<PositionSample> {
    let mut accepted: Vec<PositionSample> = Vec::with_capacity(samples.len());

    for sample in samples {
        if !config.is_accurate(sample) {
            continue;
        }

        if let Some(last) = accepted.last() {
            if !config.is_plausible_move(last, sample) {
                tracing::trace!("Rejected implausible fix {}", sample.id);
                continue;
            }
        }

        accepted.push(*sample);
    }

    accepted
}
