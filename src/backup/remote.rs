//! Remote backup endpoint.

use crate::storage::database::{Database, DatabaseError};
use crate::storage::settings::SettingKey;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Timeout for one HTTP request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Where and as whom snapshots are uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Base URL; snapshots are PUT to `{base_url}/{file_name}`
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl RemoteTarget {
    /// Read the target from the settings table.
    ///
    /// Returns `None` when no URL is configured.
    pub fn from_settings(db: &Database) -> Result<Option<Self>, DatabaseError> {
        let base_url = match db.get_setting(SettingKey::BackupUrl)? {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => return Ok(None),
        };

        Ok(Some(Self {
            base_url,
            username: db
                .get_setting(SettingKey::BackupUsername)?
                .filter(|u| !u.is_empty()),
            password: db.get_setting(SettingKey::BackupPassword)?,
        }))
    }

    /// URL a snapshot with the given file name is uploaded to.
    pub fn upload_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), file_name)
    }
}

/// Transport for uploading snapshots.
pub trait RemoteBackup: Send + Sync + 'static {
    /// Upload one snapshot.
    fn upload(
        &self,
        target: &RemoteTarget,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<(), BackupError>> + Send;

    /// Check that the endpoint is reachable and accepts the credentials.
    fn probe(&self, target: &RemoteTarget) -> impl Future<Output = Result<(), BackupError>> + Send;
}

/// WebDAV-style HTTP endpoint: `PUT` to upload, `OPTIONS` to probe.
pub struct HttpRemoteBackup {
    http: reqwest::Client,
}

impl HttpRemoteBackup {
    pub fn new() -> Result<Self, BackupError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackupError::UploadFailed(e.to_string()))?;

        Ok(Self { http })
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        target: &RemoteTarget,
    ) -> reqwest::RequestBuilder {
        match &target.username {
            Some(username) => request.basic_auth(username, target.password.as_deref()),
            None => request,
        }
    }
}

impl RemoteBackup for HttpRemoteBackup {
    async fn upload(
        &self,
        target: &RemoteTarget,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BackupError> {
        let url = target.upload_url(file_name);
        tracing::debug!("Uploading {} bytes to {}", bytes.len(), url);

        let request = self
            .http
            .put(&url)
            .header("Content-Type", "application/vnd.sqlite3")
            .body(bytes);

        let response = self
            .authorize(request, target)
            .send()
            .await
            .map_err(|e| BackupError::UploadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackupError::HttpStatus(status.as_u16()));
        }

        Ok(())
    }

    async fn probe(&self, target: &RemoteTarget) -> Result<(), BackupError> {
        let request = self
            .http
            .request(reqwest::Method::OPTIONS, &target.base_url);

        let response = self
            .authorize(request, target)
            .send()
            .await
            .map_err(|e| BackupError::ProbeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackupError::HttpStatus(status.as_u16()));
        }

        Ok(())
    }
}

/// Backup errors.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Snapshot failed: {0}")]
    SnapshotFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote backup is not configured")]
    NotConfigured,

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Endpoint unreachable: {0}")]
    ProbeFailed(String),

    #[error("Endpoint answered HTTP {0}")]
    HttpStatus(u16),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}
