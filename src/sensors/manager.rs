//! Heart-rate monitor connection manager.
//!
//! Owns the link state, the observer channel and the reconnection timer.
//! Frames from a connected monitor become [`HeartRateEvent::HeartRate`]
//! events and, while a workout is active, pulse samples in the database.

use crate::sensors::heart_rate::parse_heart_rate_measurement;
use crate::sensors::types::{
    ConnectionState, DiscoveredDevice, HeartRateConfig, HeartRateEvent, LinkError,
};
use crate::storage::database::{self, SharedDatabase};
use crate::storage::settings::SettingKey;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Transport to a heart-rate monitor.
pub trait HeartRateLink: Send + Sync + 'static {
    /// Start scanning. Each advertisement is sent on the returned channel
    /// (duplicates allowed) until the scan stops.
    fn start_scan(
        &self,
    ) -> impl Future<Output = Result<mpsc::Receiver<DiscoveredDevice>, LinkError>> + Send;

    /// Stop scanning.
    fn stop_scan(&self) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Connect and subscribe to measurements. The returned channel carries
    /// raw frames; it closes when the link drops.
    fn connect(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<mpsc::Receiver<Vec<u8>>, LinkError>> + Send;

    /// Disconnect from a device.
    fn disconnect(&self, device_id: &str) -> impl Future<Output = Result<(), LinkError>> + Send;
}

/// Connects to a heart-rate monitor and records its readings.
pub struct HeartRateManager<L: HeartRateLink> {
    inner: Arc<Inner<L>>,
}

impl<L: HeartRateLink> Clone for HeartRateManager<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<L> {
    link: L,
    database: SharedDatabase,
    config: HeartRateConfig,
    state: Mutex<ManagerState>,
    event_tx: broadcast::Sender<HeartRateEvent>,
}

#[derive(Default)]
struct ManagerState {
    connection: ConnectionState,
    /// Connected device, or the last one while reconnecting
    device: Option<DiscoveredDevice>,
    last_bpm: Option<u16>,
    active_workout: Option<i64>,
    /// Devices seen during the current scan
    seen: HashMap<String, DiscoveredDevice>,
    /// Bumped on every connect attempt and explicit disconnect, so a frame
    /// task can tell whether its link drop was solicited
    generation: u64,
    scan_task: Option<JoinHandle<()>>,
    frame_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
}

impl<L: HeartRateLink> HeartRateManager<L> {
    /// Create a disconnected manager.
    pub fn new(link: L, database: SharedDatabase, config: HeartRateConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            inner: Arc::new(Inner {
                link,
                database,
                config,
                state: Mutex::new(ManagerState::default()),
                event_tx,
            }),
        }
    }

    /// Access the underlying link.
    pub fn link(&self) -> &L {
        &self.inner.link
    }

    /// Subscribe to heart-rate events.
    pub fn subscribe(&self) -> broadcast::Receiver<HeartRateEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock_state().connection
    }

    /// Most recent decoded heart rate.
    pub fn last_bpm(&self) -> Option<u16> {
        self.inner.lock_state().last_bpm
    }

    /// The connected device, if any.
    pub fn connected_device(&self) -> Option<DiscoveredDevice> {
        let state = self.inner.lock_state();
        match state.connection {
            ConnectionState::Connected => state.device.clone(),
            _ => None,
        }
    }

    /// Workout that incoming readings are attributed to.
    pub fn active_workout(&self) -> Option<i64> {
        self.inner.lock_state().active_workout
    }

    /// Whether a reconnection timer is pending.
    pub fn is_reconnecting(&self) -> bool {
        self.inner
            .lock_state()
            .reconnect_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Start scanning for heart-rate monitors.
    ///
    /// Each device is reported once per scan.
    pub async fn scan(&self) -> Result<(), LinkError> {
        {
            let mut state = self.inner.lock_state();
            if state.connection != ConnectionState::Disconnected {
                return Err(LinkError::InvalidState(state.connection));
            }
            state.seen.clear();
            self.inner.set_connection(&mut state, ConnectionState::Scanning);
        }

        tracing::info!("Starting heart-rate monitor scan");

        let mut rx = match self.inner.link.start_scan().await {
            Ok(rx) => rx,
            Err(e) => {
                let mut state = self.inner.lock_state();
                if state.connection == ConnectionState::Scanning {
                    self.inner
                        .set_connection(&mut state, ConnectionState::Disconnected);
                }
                return Err(e);
            }
        };

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(device) = rx.recv().await {
                let mut state = inner.lock_state();
                if state.seen.contains_key(&device.device_id) {
                    continue;
                }
                tracing::debug!("Discovered {} ({})", device.display_name(), device.device_id);
                state.seen.insert(device.device_id.clone(), device.clone());
                let _ = inner.event_tx.send(HeartRateEvent::Discovered(device));
            }

            let mut state = inner.lock_state();
            if state.connection == ConnectionState::Scanning {
                inner.set_connection(&mut state, ConnectionState::Disconnected);
            }
        });

        let mut state = self.inner.lock_state();
        if let Some(previous) = state.scan_task.replace(task) {
            previous.abort();
        }

        Ok(())
    }

    /// Stop a running scan. Does nothing when not scanning.
    pub async fn stop_scan(&self) -> Result<(), LinkError> {
        if !self.inner.end_scan() {
            return Ok(());
        }

        tracing::info!("Stopping heart-rate monitor scan");
        self.inner.link.stop_scan().await
    }

    /// Connect to a monitor.
    ///
    /// Stops any scan and cancels pending reconnection. On success the device
    /// is remembered as the paired monitor. Failures are not retried.
    pub async fn connect(&self, device_id: &str) -> Result<(), LinkError> {
        self.inner.cancel_reconnect();

        if self.inner.end_scan() {
            if let Err(e) = self.inner.link.stop_scan().await {
                tracing::warn!("Failed to stop scan before connecting: {}", e);
            }
        }

        if self.state() == ConnectionState::Connected {
            self.disconnect().await;
        }

        self.inner.try_connect(device_id.to_string()).await
    }

    /// Disconnect from the current monitor.
    ///
    /// Cancels pending reconnection and stops any scan. Idempotent.
    pub async fn disconnect(&self) {
        self.inner.cancel_reconnect();
        let was_scanning = self.inner.end_scan();

        let device_id = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            if let Some(task) = state.frame_task.take() {
                task.abort();
            }
            let device_id = match state.connection {
                ConnectionState::Connected | ConnectionState::Connecting => {
                    state.device.as_ref().map(|d| d.device_id.clone())
                }
                _ => None,
            };
            self.inner
                .set_connection(&mut state, ConnectionState::Disconnected);
            device_id
        };

        if was_scanning {
            if let Err(e) = self.inner.link.stop_scan().await {
                tracing::warn!("Failed to stop scan: {}", e);
            }
        }

        if let Some(device_id) = device_id {
            tracing::info!("Disconnecting from heart-rate monitor {}", device_id);
            if let Err(e) = self.inner.link.disconnect(&device_id).await {
                tracing::warn!("Failed to disconnect from {}: {}", device_id, e);
            }
        }
    }

    /// Try once to connect to the paired monitor.
    ///
    /// Returns whether a link is established. Failure is logged, not returned.
    pub async fn reconnect_to_last_device(&self) -> bool {
        self.inner.reconnect_to_last_device().await
    }

    /// Attribute incoming readings to a workout, or stop storing them.
    pub fn set_active_workout(&self, workout_id: Option<i64>) {
        self.inner.lock_state().active_workout = workout_id;
    }

    /// Start recording readings for a workout.
    ///
    /// Without a link, one connection attempt to the paired monitor runs in
    /// the background.
    pub fn start_recording(&self, workout_id: i64) {
        let mut state = self.inner.lock_state();
        state.active_workout = Some(workout_id);

        if state.connection != ConnectionState::Disconnected {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            inner.reconnect_to_last_device().await;
        });
        if let Some(previous) = state.reconnect_task.replace(task) {
            previous.abort();
        }
    }

    /// Stop recording readings and cancel pending reconnection. Idempotent.
    pub fn stop_recording(&self) {
        self.set_active_workout(None);
        self.inner.cancel_reconnect();
    }

    /// Tear down: stop recording, disconnect and stop all tasks.
    pub async fn shutdown(&self) {
        self.stop_recording();
        self.disconnect().await;

        let mut state = self.inner.lock_state();
        for task in [
            state.scan_task.take(),
            state.frame_task.take(),
            state.reconnect_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        tracing::info!("Heart-rate manager shut down");
    }
}

impl<L: HeartRateLink> Inner<L> {
    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_connection(&self, state: &mut ManagerState, connection: ConnectionState) {
        if state.connection == connection {
            return;
        }
        state.connection = connection;
        let _ = self.event_tx.send(HeartRateEvent::StateChanged(connection));
    }

    /// Leave the scanning state. Returns whether a scan was running.
    fn end_scan(&self) -> bool {
        let mut state = self.lock_state();
        if let Some(task) = state.scan_task.take() {
            task.abort();
        }
        if state.connection != ConnectionState::Scanning {
            return false;
        }
        self.set_connection(&mut state, ConnectionState::Disconnected);
        true
    }

    fn cancel_reconnect(&self) {
        let mut state = self.lock_state();
        let Some(task) = state.reconnect_task.take() else {
            return;
        };
        if task.is_finished() {
            return;
        }
        task.abort();
        tracing::debug!("Cancelled pending heart-rate reconnection");

        // An attempt may have been cut off mid-connect
        if state.connection == ConnectionState::Connecting {
            state.generation += 1;
            self.set_connection(&mut state, ConnectionState::Disconnected);
        }
    }

    async fn try_connect(self: &Arc<Self>, device_id: String) -> Result<(), LinkError> {
        let generation = {
            let mut state = self.lock_state();
            if state.connection != ConnectionState::Disconnected {
                return Err(LinkError::InvalidState(state.connection));
            }
            state.generation += 1;
            self.set_connection(&mut state, ConnectionState::Connecting);
            state.generation
        };

        tracing::info!("Connecting to heart-rate monitor {}", device_id);

        let result = tokio::time::timeout(
            self.config.connection_timeout,
            self.link.connect(&device_id),
        )
        .await
        .unwrap_or(Err(LinkError::ConnectionTimeout));

        let frames = match result {
            Ok(frames) => frames,
            Err(e) => {
                let mut state = self.lock_state();
                if state.generation == generation {
                    self.set_connection(&mut state, ConnectionState::Disconnected);
                }
                tracing::warn!("Failed to connect to {}: {}", device_id, e);
                return Err(e);
            }
        };

        let device = {
            let mut state = self.lock_state();
            if state.generation != generation {
                // Disconnected while the attempt was in flight
                return Err(LinkError::InvalidState(state.connection));
            }

            let device = state
                .seen
                .get(&device_id)
                .cloned()
                .or_else(|| {
                    state
                        .device
                        .clone()
                        .filter(|d| d.device_id == device_id && d.name.is_some())
                })
                .unwrap_or_else(|| DiscoveredDevice {
                    device_id: device_id.clone(),
                    name: None,
                });

            state.device = Some(device.clone());
            let task = self.spawn_frame_task(generation, device_id.clone(), frames);
            if let Some(previous) = state.frame_task.replace(task) {
                previous.abort();
            }
            self.set_connection(&mut state, ConnectionState::Connected);
            device
        };

        tracing::info!("Connected to heart-rate monitor {}", device.display_name());
        self.remember_device(&device);

        Ok(())
    }

    fn remember_device(&self, device: &DiscoveredDevice) {
        let result = database::lock(&self.database).and_then(|db| {
            db.set_setting(SettingKey::HeartRateDeviceId, &device.device_id)?;
            if let Some(name) = &device.name {
                db.set_setting(SettingKey::HeartRateDeviceName, name)?;
            }
            Ok(())
        });

        if let Err(e) = result {
            tracing::warn!("Failed to remember heart-rate monitor: {}", e);
        }
    }

    fn spawn_frame_task(
        self: &Arc<Self>,
        generation: u64,
        device_id: String,
        mut frames: mpsc::Receiver<Vec<u8>>,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                inner.handle_frame(&frame);
            }
            inner.handle_link_drop(generation, device_id);
        })
    }

    fn handle_frame(&self, frame: &[u8]) {
        let Some(data) = parse_heart_rate_measurement(frame) else {
            tracing::debug!("Dropped malformed heart-rate frame ({} bytes)", frame.len());
            return;
        };

        let timestamp = Utc::now();
        let workout_id = {
            let mut state = self.lock_state();
            state.last_bpm = Some(data.bpm);
            state.active_workout
        };

        let _ = self.event_tx.send(HeartRateEvent::HeartRate {
            bpm: data.bpm,
            timestamp,
        });

        let Some(workout_id) = workout_id else {
            return;
        };

        let result = database::lock(&self.database)
            .and_then(|db| db.insert_pulse_sample(workout_id, timestamp, data.bpm));
        match result {
            Ok(Some(_)) => tracing::debug!("Recorded {} bpm for workout {}", data.bpm, workout_id),
            Ok(None) => {
                tracing::info!(
                    "Workout {} is no longer active, dropping heart-rate samples",
                    workout_id
                );
                let mut state = self.lock_state();
                if state.active_workout == Some(workout_id) {
                    state.active_workout = None;
                }
            }
            Err(e) => tracing::warn!("Failed to store heart-rate sample: {}", e),
        }
    }

    fn handle_link_drop(self: &Arc<Self>, generation: u64, device_id: String) {
        let mut state = self.lock_state();
        if state.generation != generation {
            return;
        }

        tracing::warn!("Heart-rate monitor {} disconnected", device_id);
        state.frame_task = None;
        self.set_connection(&mut state, ConnectionState::Disconnected);

        if state.active_workout.is_none() {
            return;
        }

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            inner.reconnect_loop(device_id).await;
        });
        if let Some(previous) = state.reconnect_task.replace(task) {
            previous.abort();
        }
    }

    async fn reconnect_loop(self: Arc<Self>, device_id: String) {
        let attempts = self.config.max_reconnect_attempts;

        for attempt in 1..=attempts {
            tokio::time::sleep(self.config.reconnect_interval).await;

            tracing::info!(
                "Reconnecting to {} (attempt {}/{})",
                device_id,
                attempt,
                attempts
            );
            let _ = self
                .event_tx
                .send(HeartRateEvent::Reconnecting { attempt });

            match self.try_connect(device_id.clone()).await {
                Ok(()) => return,
                Err(LinkError::InvalidState(state)) => {
                    tracing::debug!("Reconnection skipped while {}", state);
                    return;
                }
                Err(_) => continue,
            }
        }

        tracing::warn!(
            "Giving up on heart-rate monitor {} after {} attempts",
            device_id,
            attempts
        );
        let _ = self.event_tx.send(HeartRateEvent::ReconnectAbandoned);
    }

    async fn reconnect_to_last_device(self: &Arc<Self>) -> bool {
        if self.lock_state().connection == ConnectionState::Connected {
            return true;
        }

        let device_id = match database::lock(&self.database)
            .and_then(|db| db.get_setting(SettingKey::HeartRateDeviceId))
        {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => {
                tracing::debug!("No paired heart-rate monitor");
                return false;
            }
            Err(e) => {
                tracing::warn!("Failed to read paired heart-rate monitor: {}", e);
                return false;
            }
        };

        match self.try_connect(device_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::info!("Paired heart-rate monitor unavailable: {}", e);
                false
            }
        }
    }
}
