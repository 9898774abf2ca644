//! Workout session lifecycle.
//!
//! The store is the only record of whether a workout is active; every
//! operation re-reads it instead of trusting in-memory state.

use crate::backup::remote::RemoteBackup;
use crate::backup::service::{BackupService, BackupStatus};
use crate::metrics::filter::{filter_reliable, FilterConfig};
use crate::metrics::summary::{LiveStats, WorkoutDetail, WorkoutSummary};
use crate::recording::types::{SessionError, SessionState, Workout};
use crate::sensors::manager::{HeartRateLink, HeartRateManager};
use crate::storage::database::{self, truncate_to_millis, DatabaseError, SharedDatabase};
use crate::tracking::tracker::{LocationSource, PositionTracker};
use crate::tracking::types::PermissionStatus;
use chrono::Utc;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinates the store, both sample producers and the backup procedure.
pub struct SessionOrchestrator<S: LocationSource, L: HeartRateLink, R: RemoteBackup> {
    database: SharedDatabase,
    tracker: PositionTracker<S>,
    heart_rate: HeartRateManager<L>,
    backup: BackupService<R>,
    filter: FilterConfig,
    pending_backup: Mutex<Option<JoinHandle<BackupStatus>>>,
}

impl<S, L, R> SessionOrchestrator<S, L, R>
where
    S: LocationSource,
    L: HeartRateLink,
    R: RemoteBackup,
{
    pub fn new(
        database: SharedDatabase,
        location: S,
        heart_rate: HeartRateManager<L>,
        backup: BackupService<R>,
        filter: FilterConfig,
    ) -> Self {
        Self {
            database,
            tracker: PositionTracker::new(location),
            heart_rate,
            backup,
            filter,
            pending_backup: Mutex::new(None),
        }
    }

    pub fn tracker(&self) -> &PositionTracker<S> {
        &self.tracker
    }

    pub fn heart_rate(&self) -> &HeartRateManager<L> {
        &self.heart_rate
    }

    pub fn backup(&self) -> &BackupService<R> {
        &self.backup
    }

    /// Current state, read from the store.
    pub fn state(&self) -> Result<SessionState, SessionError> {
        let db = database::lock(&self.database)?;
        Ok(db.active_workout()?.into())
    }

    /// Start a new workout.
    ///
    /// Requires location permission and no active workout. The heart-rate
    /// producer starts even without a link.
    pub async fn start(&self) -> Result<Workout, SessionError> {
        if self.tracker.permission() != PermissionStatus::Granted {
            return Err(SessionError::PermissionDenied);
        }

        let workout = {
            let mut db = database::lock(&self.database)?;
            if let Some(active) = db.active_workout()? {
                return Err(SessionError::AlreadyActive(active.id));
            }

            match db.insert_workout(Utc::now()) {
                Ok(workout) => workout,
                Err(DatabaseError::ConstraintViolation(_)) => {
                    // Another process won the race
                    let id = db.active_workout()?.map_or(0, |w| w.id);
                    return Err(SessionError::AlreadyActive(id));
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = self.tracker.start() {
            tracing::error!("Failed to start location updates: {}", e);
            let mut db = database::lock(&self.database)?;
            db.delete_workout(workout.id)?;
            return Err(e.into());
        }

        self.heart_rate.start_recording(workout.id);

        tracing::info!("Started workout {}", workout.id);
        Ok(workout)
    }

    /// Re-attach the producers to a workout left active by a previous run.
    ///
    /// Safe to call repeatedly.
    pub async fn resume(&self) -> Result<SessionState, SessionError> {
        let state = self.state()?;
        let Some(workout) = state.workout() else {
            tracing::debug!("No workout to resume");
            return Ok(state);
        };

        if let Err(e) = self.tracker.start() {
            tracing::warn!("Resumed workout {} without location updates: {}", workout.id, e);
        }

        self.heart_rate.set_active_workout(Some(workout.id));
        if !self.heart_rate.reconnect_to_last_device().await {
            tracing::info!("Resumed workout {} without heart-rate monitor", workout.id);
        }

        tracing::info!("Resumed workout {}", workout.id);
        Ok(state)
    }

    /// Finish the active workout, cache its aggregates and start a backup.
    ///
    /// The backup runs in the background; its outcome never affects this call.
    pub async fn finish(&self) -> Result<Workout, SessionError> {
        let active = self.active()?;

        self.tracker.stop();
        self.heart_rate.stop_recording();

        let workout = {
            let db = database::lock(&self.database)?;
            let positions = db.position_samples(active.id)?;
            let pulses = db.pulse_samples(active.id)?;
            let reliable = filter_reliable(&positions, &self.filter);

            let finished_at = truncate_to_millis(Utc::now());
            let summary =
                WorkoutSummary::compute(active.started_at, finished_at, &reliable, &pulses);
            db.finish_workout(active.id, finished_at, &summary)?;

            tracing::info!(
                "Finished workout {}: {:.0} m from {} of {} fixes, {} heart-rate samples",
                active.id,
                summary.distance_meters,
                reliable.len(),
                positions.len(),
                pulses.len()
            );

            db.get_workout(active.id)?
                .ok_or_else(|| DatabaseError::NotFound(format!("Workout {}", active.id)))?
        };

        let backup = self.backup.clone();
        let task = tokio::spawn(async move { backup.run().await });
        *self
            .pending_backup
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);

        Ok(workout)
    }

    /// Abandon the active workout and delete everything it recorded.
    pub async fn discard(&self) -> Result<(), SessionError> {
        let active = self.active()?;

        self.tracker.stop();
        self.heart_rate.stop_recording();

        let mut db = database::lock(&self.database)?;
        db.delete_workout(active.id)?;

        tracing::info!("Discarded workout {}", active.id);
        Ok(())
    }

    /// Wait for the backup started by the last `finish`, if any.
    pub async fn wait_for_backup(&self) -> Option<BackupStatus> {
        let task = self
            .pending_backup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        match task.await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::error!("Backup task failed: {}", e);
                Some(BackupStatus::Failed)
            }
        }
    }

    /// Statistics of the active workout so far.
    pub fn live_stats(&self) -> Result<Option<LiveStats>, SessionError> {
        let db = database::lock(&self.database)?;
        let Some(workout) = db.active_workout()? else {
            return Ok(None);
        };

        let positions = filter_reliable(&db.position_samples(workout.id)?, &self.filter);
        let pulses = db.pulse_samples(workout.id)?;

        Ok(Some(LiveStats::compute(
            workout.id,
            workout.started_at,
            Utc::now(),
            &positions,
            &pulses,
        )))
    }

    /// Summary, splits and sample counts of any workout.
    pub fn workout_detail(&self, id: i64) -> Result<Option<WorkoutDetail>, SessionError> {
        let db = database::lock(&self.database)?;
        let Some(workout) = db.get_workout(id)? else {
            return Ok(None);
        };

        let positions = db.position_samples(id)?;
        let reliable = filter_reliable(&positions, &self.filter);
        let pulses = db.pulse_samples(id)?;

        Ok(Some(WorkoutDetail::build(
            workout,
            positions.len(),
            &reliable,
            &pulses,
            Utc::now(),
        )))
    }

    /// Workouts, most recent first.
    pub fn list_workouts(&self, limit: Option<u32>) -> Result<Vec<Workout>, SessionError> {
        let db = database::lock(&self.database)?;
        Ok(db.list_workouts(limit)?)
    }

    pub fn subscribe_backup_status(&self) -> broadcast::Receiver<BackupStatus> {
        self.backup.subscribe()
    }

    pub fn backup_status(&self) -> BackupStatus {
        self.backup.status()
    }

    /// Stop both producers and disconnect the heart-rate monitor.
    pub async fn shutdown(&self) {
        self.tracker.stop();
        self.heart_rate.shutdown().await;
    }

    fn active(&self) -> Result<Workout, SessionError> {
        self.state()?
            .workout()
            .cloned()
            .ok_or(SessionError::NoActiveWorkout)
    }
}
