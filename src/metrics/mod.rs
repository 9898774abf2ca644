//! Derivation of distance, pace, splits and workout aggregates from stored samples.

pub mod distance;
pub mod filter;
pub mod pace;
pub mod splits;
pub mod summary;

pub use distance::{haversine_distance, track_distance};
pub use filter::{filter_reliable, FilterConfig};
pub use pace::{format_pace, windowed_pace};
pub use splits::{kilometre_splits, Split};
pub use summary::{LiveStats, WorkoutDetail, WorkoutSummary};
