//! Seams between the bridge and the remote filesystem.
//!
//! The russh-backed implementation lives in [`super::client`] and
//! [`super::session`]; tests plug in an in-memory remote.

use std::path::Path;

use async_trait::async_trait;

use crate::error::SftpError;

use super::types::RemoteEntry;

/// An authenticated, stateful channel to the remote server.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// List the entries of a remote directory (without `.` and `..`).
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SftpError>;

    /// Copy a remote file to `local_path`, returning the byte count.
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, SftpError>;

    /// Copy `local_path` to a remote file, replacing it if it exists.
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, SftpError>;

    async fn remove_file(&self, path: &str) -> Result<(), SftpError>;

    async fn exists(&self, path: &str) -> Result<bool, SftpError>;

    /// False once the underlying connection has gone away.
    fn is_healthy(&self) -> bool;

    async fn close(&self);
}

/// Opens new sessions to one remote endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, SftpError>;

    /// `user@host:port`, for log lines
    fn endpoint(&self) -> String;
}
