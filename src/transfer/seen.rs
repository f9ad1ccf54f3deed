//! Names of files already downloaded
//!
//! The set is consulted before every transfer so a file that could not be
//! deleted remotely is never fetched twice. When a store path is configured
//! the set survives restarts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::write_atomic;
use crate::error::{ConfigError, SftpError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenFile {
    names: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SeenSet {
    names: Mutex<HashSet<String>>,
    store: Option<PathBuf>,
}

impl SeenSet {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed set. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let names = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
                path: path.clone(),
                source: e,
            })?;
            let file: SeenFile = serde_json::from_str(&content).map_err(|e| {
                ConfigError::Invalid(format!("seen store {}: {}", path.display(), e))
            })?;
            file.names.into_iter().collect()
        } else {
            HashSet::new()
        };

        tracing::debug!(path = %path.display(), count = names.len(), "Loaded seen set");

        Ok(Self {
            names: Mutex::new(names),
            store: Some(path),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().contains(name)
    }

    /// Record a name. Returns false when it was already present.
    ///
    /// The in-memory set is updated even when persisting fails.
    pub async fn insert(&self, name: &str) -> Result<bool, SftpError> {
        let snapshot = {
            let mut names = self.names.lock();
            if !names.insert(name.to_string()) {
                return Ok(false);
            }
            self.store.as_ref().map(|_| {
                let mut sorted: Vec<String> = names.iter().cloned().collect();
                sorted.sort();
                sorted
            })
        };

        if let (Some(path), Some(names)) = (self.store.clone(), snapshot) {
            persist(path, names).await?;
        }
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_deref()
    }
}

async fn persist(path: PathBuf, names: Vec<String>) -> Result<(), SftpError> {
    let content = serde_json::to_string_pretty(&SeenFile { names })
        .map_err(|e| SftpError::LocalIo(format!("Failed to encode seen set: {}", e)))?;

    let target = path.clone();
    let written = tokio::task::spawn_blocking(move || {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(&target, &content)
    })
    .await
    .map_err(|e| SftpError::LocalIo(format!("Seen set writer panicked: {}", e)))?;

    written.map_err(|e| {
        SftpError::LocalIo(format!("Failed to write seen set {}: {}", path.display(), e))
    })
}
