//! Point-in-time database snapshots and local retention.

use crate::backup::remote::BackupError;
use crate::storage::database::Database;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// File name for a snapshot taken at `at`, e.g.
/// `paceline-2024-05-01T07-00-00-000Z.sqlite`.
pub fn snapshot_file_name(prefix: &str, extension: &str, at: DateTime<Utc>) -> String {
    let timestamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}-{}.{}", prefix, timestamp, extension)
}

/// Write a self-contained copy of the database into `dir`.
///
/// Producers may keep writing while this runs; the copy reflects one
/// committed state.
pub fn create_snapshot(db: &Database, dir: &Path, file_name: &str) -> Result<PathBuf, BackupError> {
    fs::create_dir_all(dir)?;

    let path = dir.join(file_name);
    if path.exists() {
        fs::remove_file(&path)?;
    }

    db.snapshot_into(&path)
        .map_err(|e| BackupError::SnapshotFailed(e.to_string()))?;

    tracing::debug!("Wrote snapshot {}", path.display());
    Ok(path)
}

/// Copy a snapshot into the local retention directory.
pub fn store_local(snapshot: &Path, dir: &Path, file_name: &str) -> Result<PathBuf, BackupError> {
    fs::create_dir_all(dir)?;

    let dest = dir.join(file_name);
    fs::copy(snapshot, &dest)?;
    Ok(dest)
}

/// Delete all but the newest `retention` snapshots in `dir`.
///
/// Only files named `{prefix}-*.{extension}` are considered. The timestamp
/// format sorts lexically, so the newest are the last by name. Returns the
/// removed paths.
pub fn prune_snapshots(
    dir: &Path,
    prefix: &str,
    extension: &str,
    retention: usize,
) -> Result<Vec<PathBuf>, BackupError> {
    let head = format!("{}-", prefix);
    let tail = format!(".{}", extension);

    let mut snapshots: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&head) && name.ends_with(&tail))
        })
        .collect();

    snapshots.sort();
    let excess = snapshots.len().saturating_sub(retention);

    let mut removed = Vec::with_capacity(excess);
    for path in snapshots.into_iter().take(excess) {
        fs::remove_file(&path)?;
        tracing::debug!("Pruned old snapshot {}", path.display());
        removed.push(path);
    }

    Ok(removed)
}
