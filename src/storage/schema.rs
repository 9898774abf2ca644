//! Database schema definitions for Paceline.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Workouts table
CREATE TABLE IF NOT EXISTS workouts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    distance_meters REAL,
    avg_pace_secs_per_km REAL,
    avg_heart_rate REAL
);

CREATE INDEX IF NOT EXISTS idx_workouts_started_at ON workouts(started_at);

-- At most one workout may be unfinished at any time
CREATE UNIQUE INDEX IF NOT EXISTS idx_workouts_single_active
    ON workouts((finished_at IS NULL)) WHERE finished_at IS NULL;

-- GPS fixes
CREATE TABLE IF NOT EXISTS position_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workout_id INTEGER NOT NULL REFERENCES workouts(id),
    recorded_at TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    speed_mps REAL,
    accuracy_meters REAL
);

CREATE INDEX IF NOT EXISTS idx_position_samples_workout
    ON position_samples(workout_id, recorded_at);

-- Heart-rate readings
CREATE TABLE IF NOT EXISTS pulse_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workout_id INTEGER NOT NULL REFERENCES workouts(id),
    recorded_at TEXT NOT NULL,
    bpm INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pulse_samples_workout
    ON pulse_samples(workout_id, recorded_at);

-- Process-wide key/value settings
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// SQL for schema version tracking (migrations)
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;
