//! Database operations using rusqlite.
//!
//! Every execution context (orchestrator, heart-rate manager, positional
//! ingestion, backup) may open its own [`Database`] against the same file.

use crate::metrics::summary::WorkoutSummary;
use crate::recording::types::Workout;
use crate::sensors::types::PulseSample;
use crate::storage::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};
use crate::storage::settings::SettingKey;
use crate::tracking::types::{PositionFix, PositionSample};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// A database connection shared between tasks of one process.
pub type SharedDatabase = Arc<Mutex<Database>>;

/// How long a connection waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database wrapper for SQLite operations.
pub struct Database {
    conn: Connection,
    /// File backing this connection; `None` for in-memory databases
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::IoError(e.to_string()))?;
            }
        }

        let conn =
            Connection::open(path).map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.configure()?;
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn, path: None };
        db.configure()?;
        db.initialize()?;

        Ok(db)
    }

    /// File backing this database, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Wrap this connection for sharing between tasks.
    pub fn into_shared(self) -> SharedDatabase {
        Arc::new(Mutex::new(self))
    }

    /// Apply per-connection pragmas.
    fn configure(&self) -> Result<(), DatabaseError> {
        // journal_mode reports the resulting mode as a row ("memory" for in-memory databases)
        let mode: String = self
            .conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        tracing::debug!("Database journal mode: {}", mode);

        self.conn
            .pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        self.conn
            .pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        self.conn
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(())
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        let current_version = self.get_schema_version()?;

        if current_version < CURRENT_VERSION {
            self.migrate(current_version)?;
        }

        Ok(())
    }

    /// Get the current schema version.
    fn get_schema_version(&self) -> Result<i32, DatabaseError> {
        let result: SqliteResult<i32> = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Run database migrations.
    fn migrate(&self, from_version: i32) -> Result<(), DatabaseError> {
        if from_version < 1 {
            self.conn
                .execute_batch(SCHEMA)
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            // Another connection may have migrated concurrently
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO schema_version (version, applied_at)
                     VALUES (?1, datetime('now'))",
                    [CURRENT_VERSION],
                )
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            tracing::info!("Database migrated to version {}", CURRENT_VERSION);
        }

        Ok(())
    }

    // ========== Workout Operations ==========

    /// Insert a new, unfinished workout.
    ///
    /// Fails with [`DatabaseError::ConstraintViolation`] if another workout is
    /// still active.
    pub fn insert_workout(&mut self, started_at: DateTime<Utc>) -> Result<Workout, DatabaseError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let active: Option<i64> = tx
            .query_row(
                "SELECT id FROM workouts WHERE finished_at IS NULL LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if let Some(id) = active {
            return Err(DatabaseError::ConstraintViolation(format!(
                "Workout {} is still active",
                id
            )));
        }

        tx.execute(
            "INSERT INTO workouts (started_at) VALUES (?1)",
            params![format_timestamp(&started_at)],
        )
        .map_err(map_write_error)?;
        let id = tx.last_insert_rowid();

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        Ok(Workout {
            id,
            started_at: truncate_to_millis(started_at),
            finished_at: None,
            distance_meters: None,
            avg_pace_secs_per_km: None,
            avg_heart_rate: None,
        })
    }

    /// Get the active workout: the most recently started one without `finished_at`.
    pub fn active_workout(&self) -> Result<Option<Workout>, DatabaseError> {
        let result = self.conn.query_row(
            "SELECT id, started_at, finished_at, distance_meters, avg_pace_secs_per_km,
             avg_heart_rate FROM workouts WHERE finished_at IS NULL
             ORDER BY started_at DESC, id DESC LIMIT 1",
            [],
            WorkoutRow::from_row,
        );

        match result {
            Ok(row) => Ok(Some(row.into_workout()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Get a workout by ID.
    pub fn get_workout(&self, id: i64) -> Result<Option<Workout>, DatabaseError> {
        let result = self.conn.query_row(
            "SELECT id, started_at, finished_at, distance_meters, avg_pace_secs_per_km,
             avg_heart_rate FROM workouts WHERE id = ?1",
            params![id],
            WorkoutRow::from_row,
        );

        match result {
            Ok(row) => Ok(Some(row.into_workout()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// List workouts, most recent first.
    pub fn list_workouts(&self, limit: Option<u32>) -> Result<Vec<Workout>, DatabaseError> {
        let limit = limit.unwrap_or(100);

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, started_at, finished_at, distance_meters, avg_pace_secs_per_km,
                 avg_heart_rate FROM workouts ORDER BY started_at DESC, id DESC LIMIT ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit], WorkoutRow::from_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut workouts = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            workouts.push(row.into_workout()?);
        }

        Ok(workouts)
    }

    /// Mark a workout finished and store its cached aggregates.
    ///
    /// Only an unfinished workout can be finished; a finished one is immutable.
    pub fn finish_workout(
        &self,
        id: i64,
        finished_at: DateTime<Utc>,
        summary: &WorkoutSummary,
    ) -> Result<(), DatabaseError> {
        let rows_affected = self
            .conn
            .execute(
                "UPDATE workouts SET finished_at = ?2, distance_meters = ?3,
                 avg_pace_secs_per_km = ?4, avg_heart_rate = ?5
                 WHERE id = ?1 AND finished_at IS NULL",
                params![
                    id,
                    format_timestamp(&finished_at),
                    summary.distance_meters,
                    summary.avg_pace_secs_per_km,
                    summary.avg_heart_rate,
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if rows_affected == 0 {
            return Err(DatabaseError::NotFound(format!("Active workout {}", id)));
        }

        Ok(())
    }

    /// Delete a workout together with all of its samples.
    pub fn delete_workout(&mut self, id: i64) -> Result<(), DatabaseError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        // Children before parent
        tx.execute("DELETE FROM position_samples WHERE workout_id = ?1", params![id])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        tx.execute("DELETE FROM pulse_samples WHERE workout_id = ?1", params![id])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let rows_affected = tx
            .execute("DELETE FROM workouts WHERE id = ?1", params![id])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if rows_affected == 0 {
            return Err(DatabaseError::NotFound(format!("Workout {}", id)));
        }

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    /// Count workouts without a `finished_at` timestamp.
    pub fn count_active_workouts(&self) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM workouts WHERE finished_at IS NULL",
                [],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count as usize)
    }

    // ========== Position Sample Operations ==========

    /// Append one GPS fix to a workout.
    pub fn insert_position_sample(
        &self,
        workout_id: i64,
        fix: &PositionFix,
    ) -> Result<i64, DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO position_samples (workout_id, recorded_at, latitude, longitude,
                 speed_mps, accuracy_meters) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    workout_id,
                    format_timestamp(&fix.timestamp),
                    fix.latitude,
                    fix.longitude,
                    fix.speed_mps,
                    fix.accuracy_meters,
                ],
            )
            .map_err(map_write_error)?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Get all GPS samples of a workout in timestamp order.
    pub fn position_samples(&self, workout_id: i64) -> Result<Vec<PositionSample>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, workout_id, recorded_at, latitude, longitude, speed_mps,
                 accuracy_meters FROM position_samples WHERE workout_id = ?1
                 ORDER BY recorded_at, id",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![workout_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut samples = Vec::new();
        for row in rows {
            let (id, workout_id, recorded_at, latitude, longitude, speed_mps, accuracy_meters) =
                row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            samples.push(PositionSample {
                id,
                workout_id,
                timestamp: parse_timestamp(&recorded_at, "recorded_at")?,
                latitude,
                longitude,
                speed_mps,
                accuracy_meters,
            });
        }

        Ok(samples)
    }

    // ========== Pulse Sample Operations ==========

    /// Append one heart-rate reading to a workout that is still active.
    ///
    /// Returns `None` without writing when the workout is finished or gone.
    pub fn insert_pulse_sample(
        &self,
        workout_id: i64,
        recorded_at: DateTime<Utc>,
        bpm: u16,
    ) -> Result<Option<i64>, DatabaseError> {
        let rows_affected = self
            .conn
            .execute(
                "INSERT INTO pulse_samples (workout_id, recorded_at, bpm)
                 SELECT ?1, ?2, ?3 WHERE EXISTS
                 (SELECT 1 FROM workouts WHERE id = ?1 AND finished_at IS NULL)",
                params![workout_id, format_timestamp(&recorded_at), bpm],
            )
            .map_err(map_write_error)?;

        if rows_affected == 0 {
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    /// Get all heart-rate samples of a workout in timestamp order.
    pub fn pulse_samples(&self, workout_id: i64) -> Result<Vec<PulseSample>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, workout_id, recorded_at, bpm FROM pulse_samples
                 WHERE workout_id = ?1 ORDER BY recorded_at, id",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![workout_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u16>(3)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut samples = Vec::new();
        for row in rows {
            let (id, workout_id, recorded_at, bpm) =
                row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            samples.push(PulseSample {
                id,
                workout_id,
                timestamp: parse_timestamp(&recorded_at, "recorded_at")?,
                bpm,
            });
        }

        Ok(samples)
    }

    // ========== Settings ==========

    /// Read a setting.
    pub fn get_setting(&self, key: SettingKey) -> Result<Option<String>, DatabaseError> {
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }

    /// Create or overwrite a setting.
    pub fn set_setting(&self, key: SettingKey, value: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key.as_str(), value],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// Remove a setting. Returns whether it existed.
    pub fn remove_setting(&self, key: SettingKey) -> Result<bool, DatabaseError> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key.as_str()])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(rows_affected > 0)
    }

    // ========== Snapshot ==========

    /// Write a self-contained, consistent copy of the database to `dest`.
    ///
    /// `VACUUM INTO` reads inside a single transaction, so the copy includes
    /// every committed WAL frame and none of the in-flight writes.
    pub fn snapshot_into(&self, dest: &Path) -> Result<(), DatabaseError> {
        if dest.exists() {
            return Err(DatabaseError::IoError(format!(
                "Snapshot target already exists: {}",
                dest.display()
            )));
        }

        let dest = dest
            .to_str()
            .ok_or_else(|| DatabaseError::IoError("Snapshot path is not UTF-8".to_string()))?;

        self.conn
            .execute("VACUUM INTO ?1", params![dest])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }
}

/// Lock a shared database, mapping poisoning to a [`DatabaseError`].
pub fn lock(db: &SharedDatabase) -> Result<MutexGuard<'_, Database>, DatabaseError> {
    db.lock()
        .map_err(|e| DatabaseError::LockPoisoned(e.to_string()))
}

/// Format a timestamp for storage (fixed-width RFC 3339, millisecond precision).
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drop sub-millisecond precision so in-memory values match what is stored.
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::DeserializationError(format!("Invalid {} date: {}", column, e)))
}

fn map_write_error(e: rusqlite::Error) -> DatabaseError {
    match e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DatabaseError::ConstraintViolation(msg.unwrap_or_else(|| err.to_string()))
        }
        other => DatabaseError::QueryFailed(other.to_string()),
    }
}

/// Intermediate struct for reading workout rows from database.
struct WorkoutRow {
    id: i64,
    started_at: String,
    finished_at: Option<String>,
    distance_meters: Option<f64>,
    avg_pace_secs_per_km: Option<f64>,
    avg_heart_rate: Option<f64>,
}

impl WorkoutRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            distance_meters: row.get(3)?,
            avg_pace_secs_per_km: row.get(4)?,
            avg_heart_rate: row.get(5)?,
        })
    }

    fn into_workout(self) -> Result<Workout, DatabaseError> {
        let started_at = parse_timestamp(&self.started_at, "started_at")?;
        let finished_at = self
            .finished_at
            .map(|s| parse_timestamp(&s, "finished_at"))
            .transpose()?;

        Ok(Workout {
            id: self.id,
            started_at,
            finished_at,
            distance_meters: self.distance_meters,
            avg_pace_secs_per_km: self.avg_pace_secs_per_km,
            avg_heart_rate: self.avg_heart_rate,
        })
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Database lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
