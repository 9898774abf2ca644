//! Positional (GPS) ingestion.

pub mod ingest;
pub mod tracker;
pub mod types;

pub use ingest::{ingest_fixes, PositionIngestor};
pub use tracker::{ExternalLocationSource, LocationSource, PositionTracker};
pub use types::{IngestReport, PermissionStatus, PositionFix, PositionSample, TrackingError};
