//! SFTP session for file operations

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use russh::Disconnect;
use russh::client::Handle;
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::error::SftpError;
use crate::security_log;
use crate::ssh::ClientHandler;

use super::transport::RemoteSession;
use super::types::{EntryKind, RemoteEntry};

const COPY_CHUNK: usize = 32 * 1024;

#[derive(Debug)]
enum CopyError {
    /// No chunk could be read or written within the stall timeout
    Stalled,
    Io(std::io::Error),
}

/// Copy `reader` into `writer`, giving up when a single chunk makes no
/// progress within `stall`. Large transfers are not capped as a whole.
async fn copy_with_stall_timeout<R, W>(
    reader: &mut R,
    writer: &mut W,
    stall: Duration,
) -> Result<u64, CopyError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match timeout(stall, reader.read(&mut buf)).await {
            Ok(Ok(0)) => return Ok(total),
            Ok(Ok(n)) => n,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) => return Err(CopyError::Io(e)),
            Err(_) => return Err(CopyError::Stalled),
        };
        match timeout(stall, writer.write_all(&buf[..n])).await {
            Ok(Ok(())) => total += n as u64,
            Ok(Err(e)) => return Err(CopyError::Io(e)),
            Err(_) => return Err(CopyError::Stalled),
        }
    }
}

/// SFTP session over a russh connection
pub struct SftpSession {
    sftp: Mutex<RusshSftpSession>,
    handle: Mutex<Handle<ClientHandler>>,
    host: String,
    port: u16,
    op_timeout: Duration,
    /// Set when an operation timed out and the channel state is unknown
    poisoned: AtomicBool,
}

impl std::fmt::Debug for SftpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpSession")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl SftpSession {
    pub fn new(
        sftp: RusshSftpSession,
        handle: Handle<ClientHandler>,
        host: String,
        port: u16,
        op_timeout: Duration,
    ) -> Self {
        Self {
            sftp: Mutex::new(sftp),
            handle: Mutex::new(handle),
            host,
            port,
            op_timeout,
            poisoned: AtomicBool::new(false),
        }
    }

    /// A failed operation on a dead connection means the session is gone,
    /// not just the one file.
    fn classify(&self, err: SftpError) -> SftpError {
        if self.handle_closed() {
            SftpError::Connect(format!("connection to {}:{} lost: {}", self.host, self.port, err))
        } else {
            err
        }
    }

    fn handle_closed(&self) -> bool {
        self.handle
            .try_lock()
            .map(|handle| handle.is_closed())
            .unwrap_or(false)
    }

    fn timed_out(&self, what: &str, path: &str) -> SftpError {
        self.poisoned.store(true, Ordering::SeqCst);
        SftpError::Transfer(format!(
            "{} {} timed out after {}s",
            what,
            path,
            self.op_timeout.as_secs()
        ))
    }
}

#[async_trait]
impl RemoteSession for SftpSession {
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SftpError> {
        let sftp = self.sftp.lock().await;
        let read_dir = match timeout(self.op_timeout, sftp.read_dir(path)).await {
            Ok(Ok(read_dir)) => read_dir,
            Ok(Err(e)) => {
                return Err(self.classify(SftpError::List(format!(
                    "Failed to read directory {}: {}",
                    path, e
                ))));
            }
            Err(_) => return Err(self.timed_out("Listing", path)),
        };

        let mut result = Vec::new();
        for entry in read_dir {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let metadata = entry.metadata();

            let kind = if metadata.is_dir() {
                EntryKind::Directory
            } else if metadata.is_symlink() {
                EntryKind::Symlink
            } else {
                EntryKind::File
            };

            let modified = metadata.mtime.map(|mtime| {
                Utc.timestamp_opt(mtime as i64, 0)
                    .single()
                    .unwrap_or_else(Utc::now)
            });

            result.push(RemoteEntry {
                path: super::types::remote_join(path, &name),
                name,
                kind,
                size: metadata.size.unwrap_or(0),
                modified,
            });
        }

        Ok(result)
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, SftpError> {
        let sftp = self.sftp.lock().await;
        let mut remote = match timeout(self.op_timeout, sftp.open(remote_path)).await {
            Ok(Ok(file)) => file,
            Ok(Err(e)) => {
                return Err(self.classify(SftpError::Transfer(format!(
                    "Failed to open remote file {}: {}",
                    remote_path, e
                ))));
            }
            Err(_) => return Err(self.timed_out("Opening", remote_path)),
        };

        let mut local = {
            let mut options = OpenOptions::new();
            options.create(true).write(true).truncate(true);
            #[cfg(unix)]
            {
                options.mode(0o600);
            }
            options.open(local_path).await.map_err(|e| {
                SftpError::LocalIo(format!(
                    "Failed to write local file {}: {}",
                    local_path.display(),
                    e
                ))
            })?
        };

        let bytes = match copy_with_stall_timeout(&mut remote, &mut local, self.op_timeout).await {
            Ok(bytes) => bytes,
            Err(CopyError::Stalled) => return Err(self.timed_out("Downloading", remote_path)),
            Err(CopyError::Io(e)) => {
                return Err(self.classify(SftpError::Transfer(format!(
                    "Failed to download {} to {}: {}",
                    remote_path,
                    local_path.display(),
                    e
                ))));
            }
        };

        local.flush().await.map_err(|e| {
            SftpError::LocalIo(format!("Failed to flush {}: {}", local_path.display(), e))
        })?;
        local.sync_all().await.map_err(|e| {
            SftpError::LocalIo(format!("Failed to sync {}: {}", local_path.display(), e))
        })?;

        Ok(bytes)
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, SftpError> {
        let mut local = tokio::fs::File::open(local_path).await.map_err(|e| {
            SftpError::LocalIo(format!(
                "Failed to read local file {}: {}",
                local_path.display(),
                e
            ))
        })?;

        let sftp = self.sftp.lock().await;
        let open = sftp.open_with_flags(
            remote_path,
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
        );
        let mut remote = match timeout(self.op_timeout, open).await {
            Ok(Ok(file)) => file,
            Ok(Err(e)) => {
                return Err(self.classify(SftpError::Transfer(format!(
                    "Failed to open remote file {}: {}",
                    remote_path, e
                ))));
            }
            Err(_) => return Err(self.timed_out("Opening", remote_path)),
        };

        let bytes = match copy_with_stall_timeout(&mut local, &mut remote, self.op_timeout).await {
            Ok(bytes) => bytes,
            Err(CopyError::Stalled) => return Err(self.timed_out("Uploading", remote_path)),
            Err(CopyError::Io(e)) => {
                return Err(self.classify(SftpError::Transfer(format!(
                    "Failed to upload {} to {}: {}",
                    local_path.display(),
                    remote_path,
                    e
                ))));
            }
        };

        match timeout(self.op_timeout, remote.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(self.classify(SftpError::Transfer(format!(
                    "Failed to close remote file {}: {}",
                    remote_path, e
                ))));
            }
            Err(_) => return Err(self.timed_out("Closing", remote_path)),
        }

        Ok(bytes)
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        let sftp = self.sftp.lock().await;
        match timeout(self.op_timeout, sftp.remove_file(path)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.classify(SftpError::Transfer(format!(
                "Failed to remove file {}: {}",
                path, e
            )))),
            Err(_) => Err(self.timed_out("Removing", path)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, SftpError> {
        let sftp = self.sftp.lock().await;
        match timeout(self.op_timeout, sftp.try_exists(path)).await {
            Ok(Ok(exists)) => Ok(exists),
            Ok(Err(e)) => Err(self.classify(SftpError::Transfer(format!(
                "Failed to check {}: {}",
                path, e
            )))),
            Err(_) => Err(self.timed_out("Checking", path)),
        }
    }

    fn is_healthy(&self) -> bool {
        !self.poisoned.load(Ordering::SeqCst) && !self.handle_closed()
    }

    async fn close(&self) {
        let handle = self.handle.lock().await;
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
        {
            tracing::debug!("Disconnect from {}:{} failed: {}", self.host, self.port, e);
        }
        security_log::log_sftp_disconnect(&self.host, self.port, "closed by bridge");
    }
}
