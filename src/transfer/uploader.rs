//! Local file to remote directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SftpError;
use crate::pool::SessionPool;
use crate::sftp::{format_size, remote_join};

/// Chooses the remote file name for an upload.
pub trait FileNameGenerator: Send + Sync {
    fn remote_name(&self, local_path: &Path) -> Option<String>;
}

/// Uses the local file's basename unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasenameGenerator;

impl FileNameGenerator for BasenameGenerator {
    fn remote_name(&self, local_path: &Path) -> Option<String> {
        local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

impl<F> FileNameGenerator for F
where
    F: Fn(&Path) -> Option<String> + Send + Sync,
{
    fn remote_name(&self, local_path: &Path) -> Option<String> {
        self(local_path)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadRecord {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
}

pub struct Uploader {
    pool: Arc<SessionPool>,
    remote_directory: String,
    naming: Arc<dyn FileNameGenerator>,
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("remote_directory", &self.remote_directory)
            .finish_non_exhaustive()
    }
}

impl Uploader {
    pub fn new(pool: Arc<SessionPool>, remote_directory: impl Into<String>) -> Self {
        Self {
            pool,
            remote_directory: remote_directory.into(),
            naming: Arc::new(BasenameGenerator),
        }
    }

    pub fn with_name_generator(mut self, naming: Arc<dyn FileNameGenerator>) -> Self {
        self.naming = naming;
        self
    }

    pub fn remote_directory(&self) -> &str {
        &self.remote_directory
    }

    /// Upload one regular file, overwriting any remote file of the same name.
    pub async fn upload(&self, local_path: &Path) -> Result<UploadRecord, SftpError> {
        let metadata = tokio::fs::metadata(local_path).await.map_err(|e| {
            SftpError::InvalidPayload(format!("{}: {}", local_path.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(SftpError::InvalidPayload(format!(
                "{} is not a regular file",
                local_path.display()
            )));
        }

        let name = self
            .naming
            .remote_name(local_path)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                SftpError::InvalidPayload(format!(
                    "no remote name for {}",
                    local_path.display()
                ))
            })?;
        let remote_path = remote_join(&self.remote_directory, &name);

        let session = self.pool.acquire().await?;
        let result = session.upload(local_path, &remote_path).await;
        self.pool.finish(session, &result).await;

        let size = result.map_err(|e| match e {
            SftpError::LocalIo(msg) => SftpError::Transfer(msg),
            other => other,
        })?;

        tracing::info!(
            file = %name,
            bytes = size,
            local = %local_path.display(),
            remote = %remote_path,
            "Uploaded {} ({})",
            name,
            format_size(size)
        );

        Ok(UploadRecord {
            local_path: local_path.to_path_buf(),
            remote_path,
            size,
            timestamp: Utc::now(),
        })
    }
}
