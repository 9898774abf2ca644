//! Positional ingestion.
//!
//! The location subsystem may run this in a process that is relaunched for
//! every delivery, so nothing here survives between calls: the active workout
//! is looked up in the store for every batch.

use crate::storage::database::Database;
use crate::tracking::types::{IngestReport, PositionFix};
use std::path::{Path, PathBuf};

/// Append a batch of fixes to the active workout.
///
/// Never fails: a missing workout drops the batch, and a bad fix or failed
/// insert is logged and skipped so later fixes still land.
pub fn ingest_fixes(db: &Database, fixes: &[PositionFix]) -> IngestReport {
    let mut report = IngestReport::default();

    if fixes.is_empty() {
        return report;
    }

    let workout = match db.active_workout() {
        Ok(Some(workout)) => workout,
        Ok(None) => {
            tracing::debug!("No active workout, dropping {} fix(es)", fixes.len());
            report.dropped = fixes.len();
            return report;
        }
        Err(e) => {
            tracing::error!("Failed to resolve active workout: {}", e);
            report.failed = fixes.len();
            return report;
        }
    };
    report.workout_id = Some(workout.id);

    for fix in fixes {
        if !fix.has_valid_coordinates() {
            tracing::warn!(
                "Skipping fix with invalid coordinates ({}, {})",
                fix.latitude,
                fix.longitude
            );
            report.failed += 1;
            continue;
        }

        match db.insert_position_sample(workout.id, fix) {
            Ok(_) => report.inserted += 1,
            Err(e) => {
                tracing::error!("Failed to store fix for workout {}: {}", workout.id, e);
                report.failed += 1;
            }
        }
    }

    tracing::debug!(
        "Ingested {} of {} fix(es) into workout {}",
        report.inserted,
        fixes.len(),
        workout.id
    );

    report
}

/// Entry point for fixes delivered to a (possibly freshly launched) process.
///
/// Holds only the database location and opens a new connection per delivery.
#[derive(Debug, Clone)]
pub struct PositionIngestor {
    database_path: PathBuf,
}

impl PositionIngestor {
    /// Create an ingestor writing to the database at `database_path`.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    /// Path of the database fixes are written to.
    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// Handle one delivery of fixes.
    pub fn handle(&self, fixes: &[PositionFix]) -> IngestReport {
        match Database::open(&self.database_path) {
            Ok(db) => ingest_fixes(&db, fixes),
            Err(e) => {
                tracing::error!(
                    "Failed to open {} for ingestion: {}",
                    self.database_path.display(),
                    e
                );
                IngestReport {
                    failed: fixes.len(),
                    ..Default::default()
                }
            }
        }
    }
}
