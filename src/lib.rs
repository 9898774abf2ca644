//! Paceline - GPS and heart-rate workout recorder
//!
//! Records a workout from two independent feeds (GPS fixes and BLE
//! heart-rate frames) into one SQLite database, derives distance, pace and
//! per-kilometre splits from it, and backs the database up after each
//! workout.

pub mod backup;
pub mod metrics;
pub mod recording;
pub mod sensors;
pub mod storage;
pub mod tracking;

// Re-export commonly used types
pub use backup::service::{BackupService, BackupStatus};
pub use recording::session::SessionOrchestrator;
pub use sensors::manager::HeartRateManager;
pub use storage::config::AppConfig;
pub use storage::database::{Database, SharedDatabase};
pub use tracking::ingest::PositionIngestor;
