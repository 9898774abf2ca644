//! Unit tests for the database-backed settings store.

use paceline::backup::RemoteTarget;
use paceline::storage::{Database, SettingKey};
use tempfile::TempDir;

#[test]
fn test_settings_visible_to_other_connections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paceline.sqlite");

    let writer = Database::open(&path).unwrap();
    writer
        .set_setting(SettingKey::HeartRateDeviceId, "AA:BB:CC:DD:EE:FF")
        .unwrap();

    let reader = Database::open(&path).unwrap();
    assert_eq!(
        reader.get_setting(SettingKey::HeartRateDeviceId).unwrap().as_deref(),
        Some("AA:BB:CC:DD:EE:FF")
    );
}

#[test]
fn test_overwrite_and_remove() {
    let db = Database::open_in_memory().unwrap();

    assert!(db.get_setting(SettingKey::BackupUrl).unwrap().is_none());
    db.set_setting(SettingKey::BackupUrl, "https://a.example").unwrap();
    db.set_setting(SettingKey::BackupUrl, "https://b.example").unwrap();
    assert_eq!(
        db.get_setting(SettingKey::BackupUrl).unwrap().as_deref(),
        Some("https://b.example")
    );

    assert!(db.remove_setting(SettingKey::BackupUrl).unwrap());
    assert!(!db.remove_setting(SettingKey::BackupUrl).unwrap());
    assert!(db.get_setting(SettingKey::BackupUrl).unwrap().is_none());
}

#[test]
fn test_remote_target_requires_url() {
    let db = Database::open_in_memory().unwrap();
    db.set_setting(SettingKey::BackupUsername, "runner").unwrap();
    assert!(RemoteTarget::from_settings(&db).unwrap().is_none());

    db.set_setting(SettingKey::BackupUrl, "   ").unwrap();
    assert!(RemoteTarget::from_settings(&db).unwrap().is_none());
}

#[test]
fn test_remote_target_from_settings() {
    let db = Database::open_in_memory().unwrap();
    db.set_setting(SettingKey::BackupUrl, "https://dav.example.org/runs/").unwrap();
    db.set_setting(SettingKey::BackupUsername, "runner").unwrap();
    db.set_setting(SettingKey::BackupPassword, "hunter2").unwrap();

    let target = RemoteTarget::from_settings(&db).unwrap().unwrap();
    assert_eq!(target.username.as_deref(), Some("runner"));
    assert_eq!(target.password.as_deref(), Some("hunter2"));
    assert_eq!(
        target.upload_url("paceline-1.sqlite"),
        "https://dav.example.org/runs/paceline-1.sqlite"
    );
}
