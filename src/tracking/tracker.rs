//! Registration of location updates with the platform.

use crate::tracking::types::{PermissionStatus, TrackingError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Platform service that delivers position fixes.
///
/// Fixes themselves are delivered to [`crate::tracking::ingest`]; this trait
/// only covers permission and (un)registration.
pub trait LocationSource: Send + Sync {
    /// Current permission state for location updates.
    fn permission(&self) -> PermissionStatus;

    /// Register for location updates.
    fn start_updates(&self) -> Result<(), TrackingError>;

    /// Unregister from location updates.
    fn stop_updates(&self) -> Result<(), TrackingError>;
}

/// Idempotent start/stop wrapper around a [`LocationSource`].
pub struct PositionTracker<S: LocationSource> {
    source: S,
    running: AtomicBool,
}

impl<S: LocationSource> PositionTracker<S> {
    /// Create a stopped tracker.
    pub fn new(source: S) -> Self {
        Self {
            source,
            running: AtomicBool::new(false),
        }
    }

    /// Access the underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Current permission state.
    pub fn permission(&self) -> PermissionStatus {
        self.source.permission()
    }

    /// Whether updates are registered.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register for updates. A second call while running does nothing.
    pub fn start(&self) -> Result<(), TrackingError> {
        if self.source.permission() != PermissionStatus::Granted {
            return Err(TrackingError::PermissionDenied);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Location updates already running");
            return Ok(());
        }

        if let Err(e) = self.source.start_updates() {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        tracing::info!("Started location updates");
        Ok(())
    }

    /// Unregister from updates. Does nothing when not running.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        match self.source.stop_updates() {
            Ok(()) => tracing::info!("Stopped location updates"),
            Err(e) => tracing::warn!("Failed to stop location updates: {}", e),
        }
    }
}

/// A location source whose fixes arrive out-of-band (for example through
/// `paceline ingest`); permission is configured up front.
#[derive(Debug)]
pub struct ExternalLocationSource {
    permission: PermissionStatus,
}

impl ExternalLocationSource {
    /// Create a source reporting the given permission.
    pub fn new(permission: PermissionStatus) -> Self {
        Self { permission }
    }
}

impl LocationSource for ExternalLocationSource {
    fn permission(&self) -> PermissionStatus {
        self.permission
    }

    fn start_updates(&self) -> Result<(), TrackingError> {
        Ok(())
    }

    fn stop_updates(&self) -> Result<(), TrackingError> {
        Ok(())
    }
}
