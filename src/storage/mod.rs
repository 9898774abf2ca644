//! Storage module for the workout database and configuration.

pub mod config;
pub mod database;
pub mod schema;
pub mod settings;

pub use config::{AppConfig, ConfigError};
pub use database::{Database, DatabaseError, SharedDatabase};
pub use settings::SettingKey;
