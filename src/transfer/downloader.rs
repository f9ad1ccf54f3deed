//! Remote directory poller
//!
//! One pass lists the remote directory, downloads every matching file that
//! has not been seen before, records it, deletes the remote copy and notifies
//! handlers. Files are staged in a freshly created hidden file
//! (`.<name>.<n>.writing`) and renamed into place, so the final name only ever
//! refers to complete content and staging never touches an existing file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::DownloadConfig;
use crate::config::paths::expand_tilde;
use crate::error::{ConfigError, SftpError};
use crate::pool::{PooledSession, SessionPool};
use crate::sftp::{RemoteEntry, format_size};
use crate::validation::validate_remote_file_name;

use super::filter::FilterPattern;
use super::handler::{TransferHandler, TransferRecord};
use super::seen::SeenSet;

const PARTIAL_SUFFIX: &str = ".writing";

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub remote_directory: String,
    pub local_directory: PathBuf,
    pub filter: FilterPattern,
    pub delete_remote_files: bool,
}

impl DownloadSettings {
    pub fn from_config(config: &DownloadConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            remote_directory: config.remote_directory.clone(),
            local_directory: expand_tilde(&config.local_directory.to_string_lossy()),
            filter: config.filter_pattern()?,
            delete_remote_files: config.delete_remote_files,
        })
    }
}

/// Counters for one completed pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Regular files in the listing
    pub listed: usize,
    pub downloaded: usize,
    /// Matching files already in the seen set or already present locally
    pub skipped_seen: usize,
    pub filtered_out: usize,
    pub failed: usize,
    /// Downloads whose remote delete failed; they stay remote but are not fetched again
    pub delete_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed(PollReport),
    /// Another pass was still running
    Skipped,
}

impl PollOutcome {
    pub fn report(&self) -> Option<&PollReport> {
        match self {
            PollOutcome::Completed(report) => Some(report),
            PollOutcome::Skipped => None,
        }
    }
}

enum Step {
    Downloaded(TransferRecord),
    AlreadyLocal,
}

pub struct Downloader {
    pool: Arc<SessionPool>,
    settings: DownloadSettings,
    seen: Arc<SeenSet>,
    handlers: RwLock<Vec<Arc<dyn TransferHandler>>>,
    pass: Mutex<()>,
    staging_seq: AtomicU64,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("settings", &self.settings)
            .field("seen", &self.seen.len())
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

impl Downloader {
    pub fn new(pool: Arc<SessionPool>, settings: DownloadSettings, seen: Arc<SeenSet>) -> Self {
        Self {
            pool,
            settings,
            seen,
            handlers: RwLock::new(Vec::new()),
            pass: Mutex::new(()),
            staging_seq: AtomicU64::new(0),
        }
    }

    pub fn add_handler(&self, handler: Arc<dyn TransferHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Run one polling pass unless one is already in progress.
    pub async fn poll_once(&self) -> Result<PollOutcome, SftpError> {
        let Ok(_pass) = self.pass.try_lock() else {
            tracing::debug!("Previous poll still running, skipping this one");
            return Ok(PollOutcome::Skipped);
        };

        let report = self.run_pass().await?;
        if report.downloaded > 0 || report.failed > 0 {
            tracing::info!(
                downloaded = report.downloaded,
                failed = report.failed,
                skipped = report.skipped_seen,
                "Poll of {} finished",
                self.settings.remote_directory
            );
        } else {
            tracing::debug!(?report, "Poll finished with nothing to do");
        }
        Ok(PollOutcome::Completed(report))
    }

    /// Wait for an in-flight pass to finish.
    pub async fn wait_idle(&self) {
        let _pass = self.pass.lock().await;
    }

    async fn run_pass(&self) -> Result<PollReport, SftpError> {
        let local_dir = &self.settings.local_directory;
        tokio::fs::create_dir_all(local_dir).await.map_err(|e| {
            SftpError::LocalIo(format!(
                "Failed to create local directory {}: {}",
                local_dir.display(),
                e
            ))
        })?;

        let session = self.pool.acquire().await?;
        let entries = match session.list_dir(&self.settings.remote_directory).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.is_connection_level() {
                    self.pool.invalidate(session).await;
                } else {
                    self.pool.release(session).await;
                }
                return Err(e);
            }
        };

        let mut report = PollReport::default();
        let mut session = Some(session);

        for entry in entries.iter().filter(|e| e.is_file()) {
            report.listed += 1;

            if !self.settings.filter.matches(&entry.name) {
                report.filtered_out += 1;
                continue;
            }
            if self.seen.contains(&entry.name) {
                report.skipped_seen += 1;
                continue;
            }
            if let Err(e) = validate_remote_file_name(&entry.name) {
                tracing::warn!(remote = %entry.path, "Skipping remote entry: {}", e);
                report.failed += 1;
                continue;
            }

            let current = match session.take() {
                Some(current) => current,
                None => match self.pool.acquire().await {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        tracing::warn!("Could not reconnect, ending pass early: {}", e);
                        report.failed += 1;
                        break;
                    }
                },
            };

            match self.transfer(&current, entry, local_dir).await {
                Ok(Step::Downloaded(record)) => {
                    report.downloaded += 1;
                    if self.settings.delete_remote_files
                        && !self.delete_remote(&current, entry).await
                    {
                        report.delete_failures += 1;
                    }
                    self.notify(&record);
                    session = Some(current);
                }
                Ok(Step::AlreadyLocal) => {
                    report.skipped_seen += 1;
                    session = Some(current);
                }
                Err(e) => {
                    tracing::warn!(file = %entry.name, "Download failed: {}", e);
                    report.failed += 1;
                    if e.is_connection_level() {
                        self.pool.invalidate(current).await;
                    } else {
                        session = Some(current);
                    }
                }
            }

            // A dead session after a delete is only discovered here
            if let Some(current) = session.take_if(|s| !s.is_healthy()) {
                self.pool.invalidate(current).await;
            }
        }

        if let Some(current) = session {
            self.pool.release(current).await;
        }

        Ok(report)
    }

    async fn transfer(
        &self,
        session: &PooledSession,
        entry: &RemoteEntry,
        local_dir: &Path,
    ) -> Result<Step, SftpError> {
        let final_path = local_dir.join(&entry.name);
        if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
            // Left over from an earlier run; never overwrite local data
            tracing::debug!(file = %entry.name, "Local copy already exists, not downloading");
            self.remember(&entry.name).await;
            return Ok(Step::AlreadyLocal);
        }

        let partial = self.claim_staging(local_dir, &entry.name).await?;
        let size = match session.download(&entry.path, &partial).await {
            Ok(size) => size,
            Err(e) => {
                discard_partial(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial, &final_path).await {
            discard_partial(&partial).await;
            return Err(SftpError::LocalIo(format!(
                "Failed to move {} into place: {}",
                final_path.display(),
                e
            )));
        }

        self.remember(&entry.name).await;

        tracing::info!(
            file = %entry.name,
            bytes = size,
            remote = %entry.path,
            local = %final_path.display(),
            "Downloaded {} ({})",
            entry.name,
            format_size(size)
        );

        Ok(Step::Downloaded(TransferRecord {
            remote_path: entry.path.clone(),
            local_path: final_path,
            filename: entry.name.clone(),
            size,
            timestamp: Utc::now(),
        }))
    }

    /// Create an empty staging file that did not exist before. A listed file
    /// may carry any name, including one that looks like a staging name, so
    /// the file is created exclusively rather than derived and truncated.
    async fn claim_staging(&self, local_dir: &Path, name: &str) -> Result<PathBuf, SftpError> {
        loop {
            let seq = self.staging_seq.fetch_add(1, Ordering::Relaxed);
            let candidate = local_dir.join(format!(".{}.{}{}", name, seq, PARTIAL_SUFFIX));

            let mut options = tokio::fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            {
                options.mode(0o600);
            }
            match options.open(&candidate).await {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(SftpError::LocalIo(format!(
                        "Failed to create staging file {}: {}",
                        candidate.display(),
                        e
                    )));
                }
            }
        }
    }

    async fn remember(&self, name: &str) {
        if let Err(e) = self.seen.insert(name).await {
            tracing::warn!(file = %name, "Failed to persist seen set: {}", e);
        }
    }

    /// Returns false when the delete failed. The file is already in the seen
    /// set, so it will not be downloaded again.
    async fn delete_remote(&self, session: &PooledSession, entry: &RemoteEntry) -> bool {
        match session.remove_file(&entry.path).await {
            Ok(()) => {
                tracing::debug!(remote = %entry.path, "Deleted remote file");
                true
            }
            Err(e) => {
                tracing::warn!(remote = %entry.path, "Failed to delete remote file: {}", e);
                false
            }
        }
    }

    fn notify(&self, record: &TransferRecord) {
        let handlers: Vec<_> = self.handlers.read().clone();
        for handler in handlers {
            handler.handle(record);
        }
    }
}

async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!("Failed to remove partial file {}: {}", path.display(), e),
    }
}
