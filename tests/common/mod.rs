//! Common test utilities
//!
//! `MemoryRemote` is an in-memory SFTP server stand-in implementing the
//! bridge's `Connector`/`RemoteSession` traits, with switches for injecting
//! failures.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use sftp_bridge::BridgeConfig;
use sftp_bridge::error::SftpError;
use sftp_bridge::sftp::{Connector, EntryKind, RemoteEntry, RemoteSession, remote_join};

#[derive(Default)]
struct Inner {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeSet<String>>,
    fail_list: AtomicBool,
    fail_delete: AtomicBool,
    reject_auth: AtomicBool,
    fail_download: Mutex<HashSet<String>>,
    drop_connection_on: Mutex<HashSet<String>>,
    transfer_delay: Mutex<Option<Duration>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    downloads: AtomicUsize,
}

/// Shared in-memory remote filesystem. Clones see the same state.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.inner.files.lock().insert(path.to_string(), content.into());
    }

    pub fn mkdir(&self, path: &str) {
        self.inner.dirs.lock().insert(path.to_string());
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.files.lock().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.inner.files.lock().contains_key(path)
    }

    /// File names directly inside `dir`, sorted
    pub fn names_in(&self, dir: &str) -> Vec<String> {
        let dir = normalize_dir(dir);
        self.inner
            .files
            .lock()
            .keys()
            .filter_map(|path| {
                let (parent, name) = split_path(path);
                (parent == dir).then(|| name.to_string())
            })
            .collect()
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.inner.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.inner.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_reject_auth(&self, reject: bool) {
        self.inner.reject_auth.store(reject, Ordering::SeqCst);
    }

    /// Downloads of `name` write half the bytes, then fail
    pub fn fail_download(&self, name: &str) {
        self.inner.fail_download.lock().insert(name.to_string());
    }

    pub fn clear_download_faults(&self) {
        self.inner.fail_download.lock().clear();
    }

    /// The next download of `name` kills the session it runs on
    pub fn drop_connection_on(&self, name: &str) {
        self.inner.drop_connection_on.lock().insert(name.to_string());
    }

    pub fn set_transfer_delay(&self, delay: Duration) {
        *self.inner.transfer_delay.lock() = Some(delay);
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.inner.downloads.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.inner.transfer_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Connector for MemoryRemote {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, SftpError> {
        if self.inner.reject_auth.load(Ordering::SeqCst) {
            return Err(SftpError::Authentication(
                "Authentication rejected by server".to_string(),
            ));
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            remote: self.clone(),
            alive: AtomicBool::new(true),
        }))
    }

    fn endpoint(&self) -> String {
        "test@memory:22".to_string()
    }
}

pub struct MemorySession {
    remote: MemoryRemote,
    alive: AtomicBool,
}

impl MemorySession {
    fn check_alive(&self) -> Result<(), SftpError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SftpError::Connect("connection to memory:22 lost".to_string()))
        }
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SftpError> {
        self.check_alive()?;
        let inner = &self.remote.inner;
        if inner.fail_list.load(Ordering::SeqCst) {
            return Err(SftpError::List(format!(
                "Failed to read directory {}: permission denied",
                path
            )));
        }

        let dir = normalize_dir(path);
        let mut entries: Vec<RemoteEntry> = inner
            .dirs
            .lock()
            .iter()
            .filter(|d| split_path(d).0 == dir)
            .map(|d| RemoteEntry {
                name: split_path(d).1.to_string(),
                path: d.clone(),
                kind: EntryKind::Directory,
                size: 0,
                modified: None,
            })
            .collect();

        entries.extend(inner.files.lock().iter().filter_map(|(file, content)| {
            let (parent, name) = split_path(file);
            (parent == dir).then(|| RemoteEntry::file(path, name, content.len() as u64))
        }));

        Ok(entries)
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, SftpError> {
        self.check_alive()?;
        let inner = &self.remote.inner;
        let name = split_path(remote_path).1.to_string();

        let drop_connection = inner.drop_connection_on.lock().remove(&name);
        if drop_connection {
            self.alive.store(false, Ordering::SeqCst);
            return Err(SftpError::Connect("connection reset by peer".to_string()));
        }

        let content = inner.files.lock().get(remote_path).cloned().ok_or_else(|| {
            SftpError::Transfer(format!("Failed to open remote file {}: no such file", remote_path))
        })?;

        self.remote.pause().await;

        let fail = inner.fail_download.lock().contains(&name);
        if fail {
            let _ = tokio::fs::write(local_path, &content[..content.len() / 2]).await;
            return Err(SftpError::Transfer(format!(
                "Failed to download {}: stream closed",
                remote_path
            )));
        }

        tokio::fs::write(local_path, &content)
            .await
            .map_err(|e| SftpError::LocalIo(format!("{}: {}", local_path.display(), e)))?;
        inner.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(content.len() as u64)
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, SftpError> {
        self.check_alive()?;
        let content = tokio::fs::read(local_path)
            .await
            .map_err(|e| SftpError::LocalIo(format!("{}: {}", local_path.display(), e)))?;

        self.remote.pause().await;

        let size = content.len() as u64;
        self.remote.put(remote_path, content);
        Ok(size)
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.check_alive()?;
        if self.remote.inner.fail_delete.load(Ordering::SeqCst) {
            return Err(SftpError::Transfer(format!(
                "Failed to remove file {}: permission denied",
                path
            )));
        }
        match self.remote.inner.files.lock().remove(path) {
            Some(_) => Ok(()),
            None => Err(SftpError::Transfer(format!(
                "Failed to remove file {}: no such file",
                path
            ))),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, SftpError> {
        self.check_alive()?;
        Ok(self.remote.contains(path))
    }

    fn is_healthy(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.remote.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn normalize_dir(dir: &str) -> &str {
    if dir.len() > 1 {
        dir.trim_end_matches('/')
    } else {
        dir
    }
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

/// Temp local directories plus a config pointing at them
pub struct TestEnvironment {
    pub root: TempDir,
    pub local_dir: PathBuf,
    pub outgoing_dir: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let local_dir = root.path().join("localDownload");
        let outgoing_dir = root.path().join("outgoing");
        std::fs::create_dir_all(&outgoing_dir).expect("Failed to create outgoing dir");
        Self {
            root,
            local_dir,
            outgoing_dir,
        }
    }

    /// Config for `/upload` and `/inbox` with the given filter and extra
    /// `[download]` keys.
    pub fn config(&self, filter: &str, download_extra: &str) -> BridgeConfig {
        let toml = format!(
            r#"
            [connection]
            host = "127.0.0.1"
            port = 10022
            user = "test"
            password = "test"

            [pool]
            checkout_timeout_secs = 5

            [upload]
            remote_directory = "/upload"

            [download]
            remote_directory = "/inbox"
            filter = "{}"
            local_directory = {:?}
            poll_interval_secs = 1
            {}
            "#,
            filter,
            self.local_dir.to_string_lossy(),
            download_extra
        );
        BridgeConfig::from_toml_str(&toml).expect("test config must be valid")
    }

    /// Write a file to the outgoing directory and return its path
    pub fn outgoing(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.outgoing_dir.join(name);
        std::fs::write(&path, content).expect("Failed to write outgoing file");
        path
    }

    pub fn local(&self, name: &str) -> PathBuf {
        self.local_dir.join(name)
    }

    /// Names in the local download directory, sorted
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(&self.local_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote path helper mirroring the bridge's joining rules
pub fn inbox(name: &str) -> String {
    remote_join("/inbox", name)
}

pub fn upload_dir(name: &str) -> String {
    remote_join("/upload", name)
}
