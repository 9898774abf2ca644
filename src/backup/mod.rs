//! Consistent database snapshots, local retention and remote upload.

pub mod remote;
pub mod service;
pub mod snapshot;

pub use remote::{BackupError, HttpRemoteBackup, RemoteBackup, RemoteTarget};
pub use service::{BackupConfig, BackupService, BackupStatus};
