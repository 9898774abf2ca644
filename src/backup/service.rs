//! The backup procedure and its status channel.

use crate::backup::remote::{BackupError, RemoteBackup, RemoteTarget};
use crate::backup::snapshot::{create_snapshot, prune_snapshots, snapshot_file_name, store_local};
use crate::storage::database::{self, Database, SharedDatabase};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Where snapshots are written and how many are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    /// Local retention directory
    pub local_dir: PathBuf,
    /// Directory for the temporary snapshot file
    pub scratch_dir: PathBuf,
    /// Number of local snapshots to keep
    pub retention: usize,
    /// Snapshot file name prefix
    pub file_prefix: String,
    /// Snapshot file extension
    pub extension: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::from("backups"),
            scratch_dir: PathBuf::from("tmp"),
            retention: 10,
            file_prefix: "paceline".to_string(),
            extension: "sqlite".to_string(),
        }
    }
}

/// Outcome of the most recent backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    /// No remote endpoint is configured
    NotConfigured,
    /// Configured, nothing has run yet
    Idle,
    InProgress,
    Success,
    Failed,
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStatus::NotConfigured => write!(f, "not_configured"),
            BackupStatus::Idle => write!(f, "idle"),
            BackupStatus::InProgress => write!(f, "in_progress"),
            BackupStatus::Success => write!(f, "success"),
            BackupStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshots the database, keeps local copies and uploads to the remote.
pub struct BackupService<R: RemoteBackup> {
    database: SharedDatabase,
    remote: Arc<R>,
    config: BackupConfig,
    status: Arc<Mutex<BackupStatus>>,
    status_tx: broadcast::Sender<BackupStatus>,
    /// Serializes concurrent runs
    run_lock: Arc<tokio::sync::Mutex<()>>,
}

impl<R: RemoteBackup> Clone for BackupService<R> {
    fn clone(&self) -> Self {
        Self {
            database: Arc::clone(&self.database),
            remote: Arc::clone(&self.remote),
            config: self.config.clone(),
            status: Arc::clone(&self.status),
            status_tx: self.status_tx.clone(),
            run_lock: Arc::clone(&self.run_lock),
        }
    }
}

impl<R: RemoteBackup> BackupService<R> {
    /// Create a service. The endpoint counts as unconfigured until
    /// [`refresh_status`](Self::refresh_status) has probed it.
    pub fn new(database: SharedDatabase, remote: R, config: BackupConfig) -> Self {
        let (status_tx, _) = broadcast::channel(16);
        Self {
            database,
            remote: Arc::new(remote),
            config,
            status: Arc::new(Mutex::new(BackupStatus::NotConfigured)),
            status_tx,
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Access the remote transport.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Latest status.
    pub fn status(&self) -> BackupStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<BackupStatus> {
        self.status_tx.subscribe()
    }

    fn publish(&self, status: BackupStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
        let _ = self.status_tx.send(status);
    }

    fn remote_target(&self) -> Result<Option<RemoteTarget>, BackupError> {
        let db = database::lock(&self.database)?;
        Ok(RemoteTarget::from_settings(&db)?)
    }

    /// Re-evaluate the endpoint from the settings.
    ///
    /// `idle` only once the endpoint answers the probe; `failed` when it does
    /// not; `not_configured` without a URL.
    pub async fn refresh_status(&self) -> BackupStatus {
        let status = match self.probe_remote().await {
            Ok(()) => BackupStatus::Idle,
            Err(BackupError::NotConfigured) => BackupStatus::NotConfigured,
            Err(e) => {
                tracing::warn!("Backup endpoint unavailable: {}", e);
                BackupStatus::Failed
            }
        };
        self.publish(status);
        status
    }

    /// Check that the configured endpoint is reachable.
    pub async fn probe_remote(&self) -> Result<(), BackupError> {
        let target = self.remote_target()?.ok_or(BackupError::NotConfigured)?;
        self.remote.probe(&target).await?;
        tracing::info!("Backup endpoint {} is reachable", target.base_url);
        Ok(())
    }

    /// Run one backup. Failures are reported through the status only.
    pub async fn run(&self) -> BackupStatus {
        let _guard = self.run_lock.lock().await;
        self.publish(BackupStatus::InProgress);

        let file_name = snapshot_file_name(
            &self.config.file_prefix,
            &self.config.extension,
            Utc::now(),
        );
        let scratch = self.config.scratch_dir.join(&file_name);

        let status = self.run_steps(&file_name).await;

        if scratch.exists() {
            if let Err(e) = std::fs::remove_file(&scratch) {
                tracing::warn!("Failed to remove scratch snapshot {}: {}", scratch.display(), e);
            }
        }

        match status {
            BackupStatus::Failed => tracing::error!("Backup {} failed", file_name),
            status => tracing::info!("Backup {} finished: {}", file_name, status),
        }
        self.publish(status);
        status
    }

    async fn run_steps(&self, file_name: &str) -> BackupStatus {
        // 1. Snapshot
        let database = Arc::clone(&self.database);
        let config = self.config.clone();
        let name = file_name.to_string();
        let snapshot = tokio::task::spawn_blocking(move || {
            let path = database::lock(&database)?.path().map(Path::to_path_buf);
            match path {
                // Own connection, so producers keep the shared one meanwhile
                Some(path) => create_snapshot(&Database::open(&path)?, &config.scratch_dir, &name),
                None => create_snapshot(&*database::lock(&database)?, &config.scratch_dir, &name),
            }
        })
        .await;

        let snapshot = match snapshot {
            Ok(Ok(path)) => path,
            Ok(Err(e)) => {
                tracing::error!("Failed to snapshot database: {}", e);
                return BackupStatus::Failed;
            }
            Err(e) => {
                tracing::error!("Snapshot task failed: {}", e);
                return BackupStatus::Failed;
            }
        };

        // 2. Local retention
        match store_local(&snapshot, &self.config.local_dir, file_name) {
            Ok(path) => {
                tracing::info!("Stored local backup {}", path.display());
                if let Err(e) = prune_snapshots(
                    &self.config.local_dir,
                    &self.config.file_prefix,
                    &self.config.extension,
                    self.config.retention,
                ) {
                    tracing::warn!("Failed to prune local backups: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to store local backup: {}", e),
        }

        // 3. Remote upload
        let target = match self.remote_target() {
            Ok(Some(target)) => target,
            Ok(None) => return BackupStatus::NotConfigured,
            Err(e) => {
                tracing::error!("Failed to read backup settings: {}", e);
                return BackupStatus::Failed;
            }
        };

        if let Err(e) = self.remote.probe(&target).await {
            tracing::error!("Backup endpoint {} unavailable: {}", target.base_url, e);
            return BackupStatus::Failed;
        }

        let bytes = match std::fs::read(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to read snapshot: {}", e);
                return BackupStatus::Failed;
            }
        };

        match self.remote.upload(&target, file_name, bytes).await {
            Ok(()) => BackupStatus::Success,
            Err(e) => {
                tracing::error!("Failed to upload backup: {}", e);
                BackupStatus::Failed
            }
        }
    }
}
