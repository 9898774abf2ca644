//! Positional ingestion through a freshly opened connection per delivery.

use super::mocks::fix;
use paceline::storage::database::Database;
use paceline::tracking::{PositionFix, PositionIngestor};
use chrono::Utc;
use tempfile::TempDir;

#[test]
fn test_fixes_without_active_workout_are_dropped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paceline.sqlite");
    let ingestor = PositionIngestor::new(&path);

    let now = Utc::now();
    let report = ingestor.handle(&[fix(now, 0, 0.0, 5.0), fix(now, 1, 2.0, 5.0)]);

    assert_eq!(report.dropped, 2);
    assert_eq!(report.inserted, 0);
    assert!(report.workout_id.is_none());
}

#[test]
fn test_invalid_fix_does_not_block_batch() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paceline.sqlite");
    let workout = Database::open(&path)
        .unwrap()
        .insert_workout(Utc::now())
        .unwrap();

    let ingestor = PositionIngestor::new(&path);
    let bad = PositionFix {
        latitude: f64::NAN,
        ..fix(workout.started_at, 1, 0.0, 5.0)
    };
    let report = ingestor.handle(&[
        fix(workout.started_at, 0, 0.0, 5.0),
        bad,
        fix(workout.started_at, 2, 5.0, 5.0),
    ]);

    assert_eq!(report.workout_id, Some(workout.id));
    assert_eq!(report.inserted, 2);
    assert_eq!(report.failed, 1);

    let stored = Database::open(&path)
        .unwrap()
        .position_samples(workout.id)
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored[0].timestamp < stored[1].timestamp);
}

#[test]
fn test_each_delivery_reads_current_workout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paceline.sqlite");
    let ingestor = PositionIngestor::new(&path);

    let mut db = Database::open(&path).unwrap();
    let first = db.insert_workout(Utc::now()).unwrap();
    assert_eq!(
        ingestor.handle(&[fix(first.started_at, 0, 0.0, 5.0)]).workout_id,
        Some(first.id)
    );

    db.delete_workout(first.id).unwrap();
    let second = db.insert_workout(Utc::now()).unwrap();
    assert_eq!(
        ingestor.handle(&[fix(second.started_at, 0, 0.0, 5.0)]).workout_id,
        Some(second.id)
    );
}
