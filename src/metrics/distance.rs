//! Great-circle distance over GPS samples.

use crate::tracking::types::PositionSample;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Slack for comparing accumulated distances against exact thresholds.
pub(crate) const DISTANCE_EPSILON_M: f64 = 1e-6;

/// Calculate the distance between two GPS points (Haversine formula).
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Distance in metres between two samples.
pub fn sample_distance(a: &PositionSample, b: &PositionSample) -> f64 {
    haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Total distance along a track, summing successive segments.
pub fn track_distance(samples: &[PositionSample]) -> f64 {
    samples
        .windows(2)
        .map(|pair| sample_distance(&pair[0], &pair[1]))
        .sum()
}
