//! Unit tests for configuration loading.

use paceline::storage::config::{load_config_from, save_config, AppConfig};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_full_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[storage]
database_file = "runs.sqlite"

[heart_rate]
reconnect_interval_secs = 5
max_reconnect_attempts = 12
connection_timeout_secs = 20

[filter]
max_accuracy_meters = 30.0
max_speed_mps = 10.0

[backup]
directory = "/srv/backups"
retention = 4
file_prefix = "runs"
"#,
    )
    .unwrap();

    let config = load_config_from(&path, dir.path().to_path_buf()).unwrap();

    assert_eq!(config.database_path(), dir.path().join("runs.sqlite"));

    let hr = config.heart_rate_config();
    assert_eq!(hr.reconnect_interval, Duration::from_secs(5));
    assert_eq!(hr.max_reconnect_attempts, 12);
    assert_eq!(hr.connection_timeout, Duration::from_secs(20));

    let filter = config.filter_config();
    assert_eq!(filter.max_accuracy_meters, 30.0);
    assert_eq!(filter.max_speed_mps, 10.0);

    let backup = config.backup_config();
    assert_eq!(backup.local_dir, PathBuf::from("/srv/backups"));
    assert_eq!(backup.scratch_dir, dir.path().join("tmp"));
    assert_eq!(backup.retention, 4);
    assert_eq!(backup.file_prefix, "runs");
}

#[test]
fn test_saved_defaults_reload_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    save_config(&AppConfig::default(), &path).unwrap();
    let loaded = load_config_from(&path, dir.path().to_path_buf()).unwrap();

    assert_eq!(loaded.heart_rate_config(), AppConfig::default().heart_rate_config());
    assert_eq!(loaded.filter_config(), AppConfig::default().filter_config());
    assert!(loaded.backup.directory.is_none());
}
