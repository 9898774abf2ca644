//! Unit tests for the filter, distance, pace and split pipeline.

use chrono::{DateTime, Utc};
use paceline::metrics::{
    filter_reliable, format_pace, kilometre_splits, track_distance, FilterConfig, LiveStats,
    WorkoutSummary,
};
use paceline::sensors::PulseSample;
use paceline::tracking::PositionSample;

const METRE: f64 = 1.0 / 111_194.926_644_558_74;
const T0: i64 = 1_700_000_000;

fn at(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(T0 * 1000 + millis).unwrap()
}

fn sample(id: i64, millis: i64, north_m: f64, east_m: f64, accuracy: Option<f64>) -> PositionSample {
    PositionSample {
        id,
        workout_id: 1,
        timestamp: at(millis),
        latitude: north_m * METRE,
        longitude: east_m * METRE,
        speed_mps: None,
        accuracy_meters: accuracy,
    }
}

/// 2.5 km northward at 5:00/km, one fix every 20 m, with a few bad fixes mixed in.
fn noisy_run() -> Vec<PositionSample> {
    let mut samples = Vec::new();
    let mut id = 0;
    for i in 0..=125 {
        id += 1;
        let millis = i * 6_000;
        samples.push(sample(id, millis, i as f64 * 20.0, 0.0, Some(5.0)));

        match i {
            // Multipath jump 400 m east, one second later
            40 => {
                id += 1;
                samples.push(sample(id, millis + 1_000, i as f64 * 20.0, 400.0, Some(8.0)));
            }
            // Fix with a poor accuracy estimate
            70 => {
                id += 1;
                samples.push(sample(id, millis + 2_000, i as f64 * 20.0 + 5.0, 0.0, Some(45.0)));
            }
            // Fix without an accuracy estimate
            90 => {
                id += 1;
                samples.push(sample(id, millis + 3_000, i as f64 * 20.0 + 10.0, 0.0, None));
            }
            _ => {}
        }
    }
    samples
}

fn pulses(every_secs: i64, until_secs: i64, bpm: impl Fn(i64) -> u16) -> Vec<PulseSample> {
    (0..=until_secs / every_secs)
        .map(|i| PulseSample {
            id: i + 1,
            workout_id: 1,
            timestamp: at(i * every_secs * 1000),
            bpm: bpm(i * every_secs),
        })
        .collect()
}

#[test]
fn test_filter_removes_glitches() {
    let raw = noisy_run();
    let reliable = filter_reliable(&raw, &FilterConfig::default());

    assert_eq!(raw.len(), 129);
    assert_eq!(reliable.len(), 126);
    assert!(reliable.iter().all(|s| s.longitude == 0.0));
    assert!((track_distance(&reliable) - 2500.0).abs() < 1e-3);

    // Unfiltered, the jump alone adds about 800 m
    assert!(track_distance(&raw) > 3200.0);
}

#[test]
fn test_splits_of_filtered_run() {
    let reliable = filter_reliable(&noisy_run(), &FilterConfig::default());
    let hr = pulses(5, 750, |s| if s < 300 { 140 } else { 160 });

    let splits = kilometre_splits(&reliable, &hr);

    assert_eq!(splits.len(), 3);
    for split in &splits[..2] {
        assert!(!split.partial);
        assert!((split.duration_secs - 300.0).abs() < 1e-9);
        assert!((split.pace_secs_per_km().unwrap() - 300.0).abs() < 0.01);
    }
    assert_eq!(splits[0].avg_heart_rate, Some(140.0));
    assert_eq!(splits[1].avg_heart_rate, Some(160.0));

    let last = &splits[2];
    assert!(last.partial);
    assert!((last.distance_meters - 500.0).abs() < 1e-3);
    assert!((last.duration_secs - 150.0).abs() < 1e-9);
}

#[test]
fn test_live_stats_mid_run() {
    let reliable = filter_reliable(&noisy_run(), &FilterConfig::default());
    // First 1.2 km, 360 s in
    let so_far: Vec<_> = reliable.into_iter().take(61).collect();
    let hr = pulses(10, 360, |_| 150);

    let stats = LiveStats::compute(1, at(0), at(365_000), &so_far, &hr);

    assert!((stats.elapsed_secs - 365.0).abs() < 1e-9);
    assert!((stats.distance_meters - 1200.0).abs() < 1e-3);
    assert!((stats.current_pace_secs_per_km.unwrap() - 300.0).abs() < 0.01);
    assert!((stats.kilometre_pace_secs_per_km.unwrap() - 300.0).abs() < 0.01);
    assert_eq!(stats.last_heart_rate, Some(150));
    assert_eq!(stats.avg_heart_rate, Some(150.0));

    // One full kilometre plus a 200 m partial
    assert_eq!(stats.splits.len(), 2);
    assert!(stats.splits[1].partial);
}

#[test]
fn test_live_stats_before_first_fix() {
    let stats = LiveStats::compute(7, at(0), at(10_000), &[], &[]);

    assert_eq!(stats.workout_id, 7);
    assert_eq!(stats.distance_meters, 0.0);
    assert!(stats.current_pace_secs_per_km.is_none());
    assert!(stats.kilometre_pace_secs_per_km.is_none());
    assert!(stats.last_heart_rate.is_none());
    assert!(stats.splits.is_empty());
}

#[test]
fn test_summary_counts_wall_clock_time() {
    let reliable = filter_reliable(&noisy_run(), &FilterConfig::default());

    // Stopped the watch a minute after the last fix
    let summary = WorkoutSummary::compute(at(0), at(810_000), &reliable, &[]);

    assert!((summary.distance_meters - 2500.0).abs() < 1e-3);
    assert!((summary.avg_pace_secs_per_km.unwrap() - 324.0).abs() < 0.01);
    assert_eq!(format_pace(summary.avg_pace_secs_per_km.unwrap()), "5:24");
    assert!(summary.avg_heart_rate.is_none());
}

#[test]
fn test_summary_without_movement() {
    let summary = WorkoutSummary::compute(at(0), at(60_000), &[], &[]);

    assert_eq!(summary.distance_meters, 0.0);
    assert!(summary.avg_pace_secs_per_km.is_none());
}
