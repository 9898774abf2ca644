//! Heart-rate monitor ingestion.
//!
//! - `heart_rate`: Heart Rate Measurement frame codec
//! - `manager`: connection state, reconnection and pulse recording
//! - `ble`: btleplug transport

pub mod ble;
pub mod heart_rate;
pub mod manager;
pub mod types;

pub use ble::BleHeartRateLink;
pub use heart_rate::{parse_heart_rate_measurement, HeartRateData};
pub use manager::{HeartRateLink, HeartRateManager};
pub use types::{
    ConnectionState, DiscoveredDevice, HeartRateConfig, HeartRateEvent, LinkError, PulseSample,
};
