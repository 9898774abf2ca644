//! Bluetooth LE heart-rate link using btleplug.

use crate::sensors::heart_rate::{HEART_RATE_MEASUREMENT_UUID, HEART_RATE_SERVICE_UUID};
use crate::sensors::manager::HeartRateLink;
use crate::sensors::types::{DiscoveredDevice, LinkError};
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio::task::JoinHandle;

/// Channel capacity for advertisements and frames.
const CHANNEL_CAPACITY: usize = 64;

/// Heart-rate link over the first Bluetooth adapter of the system.
#[derive(Default)]
pub struct BleHeartRateLink {
    /// Initialised on first use
    adapter: OnceCell<Adapter>,
    scan_task: Mutex<Option<JoinHandle<()>>>,
    /// Connected peripherals (device_id -> Peripheral)
    connected: Mutex<HashMap<String, Peripheral>>,
}

impl BleHeartRateLink {
    pub fn new() -> Self {
        Self::default()
    }

    async fn adapter(&self) -> Result<&Adapter, LinkError> {
        self.adapter
            .get_or_try_init(|| async {
                let manager = Manager::new()
                    .await
                    .map_err(|e| LinkError::BleError(e.to_string()))?;

                let adapters = manager
                    .adapters()
                    .await
                    .map_err(|e| LinkError::BleError(e.to_string()))?;

                let adapter = adapters
                    .into_iter()
                    .next()
                    .ok_or(LinkError::AdapterNotFound)?;

                tracing::info!("BLE adapter initialized");
                Ok(adapter)
            })
            .await
    }

    async fn find_peripheral(&self, device_id: &str) -> Result<Peripheral, LinkError> {
        let adapter = self.adapter().await?;

        adapter
            .peripherals()
            .await
            .map_err(|e| LinkError::BleError(e.to_string()))?
            .into_iter()
            .find(|p| p.id().to_string() == device_id)
            .ok_or_else(|| LinkError::DeviceNotFound(device_id.to_string()))
    }
}

/// Describe a peripheral if it advertises the Heart Rate service.
async fn heart_rate_device(peripheral: &Peripheral) -> Option<DiscoveredDevice> {
    let properties = peripheral.properties().await.ok()??;

    if !properties.services.contains(&HEART_RATE_SERVICE_UUID) {
        return None;
    }

    Some(DiscoveredDevice {
        device_id: peripheral.id().to_string(),
        name: properties.local_name,
    })
}

impl HeartRateLink for BleHeartRateLink {
    async fn start_scan(&self) -> Result<mpsc::Receiver<DiscoveredDevice>, LinkError> {
        let adapter = self.adapter().await?.clone();

        let mut events = adapter
            .events()
            .await
            .map_err(|e| LinkError::ScanFailed(e.to_string()))?;

        adapter
            .start_scan(ScanFilter {
                services: vec![HEART_RATE_SERVICE_UUID],
            })
            .await
            .map_err(|e| LinkError::ScanFailed(e.to_string()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };

                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };

                if let Some(device) = heart_rate_device(&peripheral).await {
                    if tx.send(device).await.is_err() {
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.scan_task.lock().await.replace(task) {
            previous.abort();
        }

        Ok(rx)
    }

    async fn stop_scan(&self) -> Result<(), LinkError> {
        if let Some(task) = self.scan_task.lock().await.take() {
            task.abort();
        }

        self.adapter()
            .await?
            .stop_scan()
            .await
            .map_err(|e| LinkError::ScanFailed(e.to_string()))
    }

    async fn connect(&self, device_id: &str) -> Result<mpsc::Receiver<Vec<u8>>, LinkError> {
        let peripheral = self.find_peripheral(device_id).await?;

        peripheral
            .connect()
            .await
            .map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;

        let measurement = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == HEART_RATE_MEASUREMENT_UUID)
            .ok_or_else(|| {
                LinkError::SubscriptionFailed("Heart Rate Measurement not found".to_string())
            })?;

        peripheral
            .subscribe(&measurement)
            .await
            .map_err(|e| LinkError::SubscriptionFailed(e.to_string()))?;

        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| LinkError::SubscriptionFailed(e.to_string()))?;

        tracing::debug!("Subscribed to characteristic: {}", measurement.uuid);

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != HEART_RATE_MEASUREMENT_UUID {
                    continue;
                }
                if tx.send(notification.value).await.is_err() {
                    break;
                }
            }
            // Stream ended - peripheral disconnected
        });

        self.connected
            .lock()
            .await
            .insert(device_id.to_string(), peripheral);

        Ok(rx)
    }

    async fn disconnect(&self, device_id: &str) -> Result<(), LinkError> {
        let peripheral = self.connected.lock().await.remove(device_id);

        if let Some(peripheral) = peripheral {
            peripheral
                .disconnect()
                .await
                .map_err(|e| LinkError::BleError(e.to_string()))?;
        }

        Ok(())
    }
}
