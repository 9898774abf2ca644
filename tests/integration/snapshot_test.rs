//! Backups taken while producers keep writing.

use super::mocks::{fix, MockRemote};
use paceline::backup::{BackupConfig, BackupService, BackupStatus};
use paceline::storage::database::Database;
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn snapshots(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    paths.sort();
    paths
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshots_consistent_under_concurrent_writes() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("paceline.sqlite");

    let db = Database::open(&db_path).unwrap().into_shared();
    let workout = db.lock().unwrap().insert_workout(chrono::Utc::now()).unwrap();

    let backup = BackupService::new(
        db.clone(),
        MockRemote::default(),
        BackupConfig {
            local_dir: dir.path().join("backups"),
            scratch_dir: dir.path().join("tmp"),
            ..Default::default()
        },
    );

    // Positional ingestion runs on its own connection
    let stop = Arc::new(AtomicBool::new(false));
    let (workout_id, started_at) = (workout.id, workout.started_at);
    let writer = {
        let stop = Arc::clone(&stop);
        let db_path = db_path.clone();
        thread::spawn(move || {
            let writer = Database::open(&db_path).unwrap();
            let mut written = 0i64;
            while !stop.load(Ordering::SeqCst) {
                writer
                    .insert_position_sample(
                        workout_id,
                        &fix(started_at, written, written as f64, 5.0),
                    )
                    .unwrap();
                written += 1;
            }
            written
        })
    };

    for _ in 0..12 {
        assert_eq!(backup.run().await, BackupStatus::NotConfigured);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    stop.store(true, Ordering::SeqCst);
    let written = writer.join().unwrap();
    assert!(written > 0);

    let kept = snapshots(&dir.path().join("backups"));
    assert_eq!(kept.len(), 10);

    let mut previous = 0i64;
    for path in &kept {
        let conn = Connection::open(path).unwrap();
        let integrity: String = conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .unwrap();
        assert_eq!(integrity, "ok");

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM position_samples WHERE workout_id = ?1",
                [workout_id],
                |row| row.get(0),
            )
            .unwrap();
        assert!(count >= previous);
        assert!(count <= written);
        previous = count;
    }

    // Scratch copies never outlive a run
    assert!(snapshots(&dir.path().join("tmp")).is_empty());
}

#[tokio::test]
async fn test_snapshot_restores_active_workout() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("paceline.sqlite"))
        .unwrap()
        .into_shared();
    let workout = db.lock().unwrap().insert_workout(chrono::Utc::now()).unwrap();

    let backup = BackupService::new(
        db.clone(),
        MockRemote::default(),
        BackupConfig {
            local_dir: dir.path().join("backups"),
            scratch_dir: dir.path().join("tmp"),
            ..Default::default()
        },
    );
    backup.run().await;

    let kept = snapshots(&dir.path().join("backups"));
    assert_eq!(kept.len(), 1);

    let restored = Database::open(&kept[0]).unwrap();
    let active = restored.active_workout().unwrap().unwrap();
    assert_eq!(active.id, workout.id);
    assert_eq!(active.started_at, workout.started_at);
}
