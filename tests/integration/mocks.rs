//! Mock collaborators for session tests.
//!
//! Stand-ins for the platform location service, the BLE heart-rate link and
//! the remote backup endpoint.

use paceline::backup::{BackupConfig, BackupError, BackupService, RemoteBackup, RemoteTarget};
use paceline::metrics::FilterConfig;
use paceline::recording::SessionOrchestrator;
use paceline::sensors::{DiscoveredDevice, HeartRateConfig, HeartRateLink, HeartRateManager, LinkError};
use paceline::storage::database::{Database, SharedDatabase};
use paceline::tracking::{LocationSource, PermissionStatus, PositionFix, TrackingError};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One metre of latitude in degrees.
pub const METRE: f64 = 1.0 / 111_194.926_644_558_74;

/// Location service with a fixed permission that counts registrations.
pub struct MockLocation {
    pub permission: PermissionStatus,
    pub fail_start: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl MockLocation {
    pub fn new(permission: PermissionStatus) -> Self {
        Self {
            permission,
            fail_start: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }
}

impl LocationSource for MockLocation {
    fn permission(&self) -> PermissionStatus {
        self.permission
    }

    fn start_updates(&self) -> Result<(), TrackingError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(TrackingError::SourceFailed("GPS unavailable".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_updates(&self) -> Result<(), TrackingError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Heart-rate link whose connection attempts succeed or fail on demand.
#[derive(Default)]
pub struct MockLink {
    pub advertisements: Vec<DiscoveredDevice>,
    pub fail_connect: AtomicBool,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    frames: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl MockLink {
    /// Sender for frames on the current link.
    pub fn sender(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.frames.lock().unwrap().clone()
    }

    /// Simulate the monitor going out of range.
    pub fn drop_link(&self) {
        self.frames.lock().unwrap().take();
    }
}

impl HeartRateLink for MockLink {
    async fn start_scan(&self) -> Result<mpsc::Receiver<DiscoveredDevice>, LinkError> {
        let (tx, rx) = mpsc::channel(16);
        for device in &self.advertisements {
            tx.send(device.clone()).await.unwrap();
        }
        Ok(rx)
    }

    async fn stop_scan(&self) -> Result<(), LinkError> {
        Ok(())
    }

    async fn connect(&self, device_id: &str) -> Result<mpsc::Receiver<Vec<u8>>, LinkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(LinkError::DeviceNotFound(device_id.to_string()));
        }
        let (tx, rx) = mpsc::channel(64);
        *self.frames.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn disconnect(&self, _device_id: &str) -> Result<(), LinkError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.drop_link();
        Ok(())
    }
}

/// Remote endpoint that records uploads.
#[derive(Default)]
pub struct MockRemote {
    pub fail: AtomicBool,
    pub uploads: Mutex<Vec<String>>,
}

impl RemoteBackup for MockRemote {
    async fn upload(
        &self,
        target: &RemoteTarget,
        file_name: &str,
        _bytes: Vec<u8>,
    ) -> Result<(), BackupError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackupError::HttpStatus(503));
        }
        self.uploads.lock().unwrap().push(target.upload_url(file_name));
        Ok(())
    }

    async fn probe(&self, _target: &RemoteTarget) -> Result<(), BackupError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackupError::ProbeFailed("connection refused".to_string()));
        }
        Ok(())
    }
}

pub type TestSession = SessionOrchestrator<MockLocation, MockLink, MockRemote>;

/// Build a session over an on-disk database in `dir`.
pub fn session(dir: &Path, permission: PermissionStatus) -> (TestSession, SharedDatabase) {
    let db = Database::open(&dir.join("paceline.sqlite"))
        .unwrap()
        .into_shared();

    let heart_rate = HeartRateManager::new(MockLink::default(), db.clone(), HeartRateConfig::default());
    let backup = BackupService::new(
        db.clone(),
        MockRemote::default(),
        BackupConfig {
            local_dir: dir.join("backups"),
            scratch_dir: dir.join("tmp"),
            ..Default::default()
        },
    );

    let session = SessionOrchestrator::new(
        db.clone(),
        MockLocation::new(permission),
        heart_rate,
        backup,
        FilterConfig::default(),
    );
    (session, db)
}

/// A fix `north_m` metres north of the origin, `seconds` after `start`.
pub fn fix(start: DateTime<Utc>, seconds: i64, north_m: f64, accuracy: f64) -> PositionFix {
    PositionFix {
        timestamp: start + chrono::Duration::seconds(seconds),
        latitude: north_m * METRE,
        longitude: 0.0,
        speed_mps: None,
        accuracy_meters: Some(accuracy),
    }
}
