//! Remote directory entries and path helpers

use chrono::{DateTime, Utc};

/// Kind of a remote directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn file(directory: &str, name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            path: remote_join(directory, name),
            kind: EntryKind::File,
            size,
            modified: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Join a remote directory and a file name with exactly one `/` between them.
///
/// Remote paths are always `/`-separated regardless of the local platform.
pub fn remote_join(directory: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if directory.is_empty() {
        name.to_string()
    } else if directory.ends_with('/') {
        format!("{}{}", directory, name)
    } else {
        format!("{}/{}", directory, name)
    }
}

/// Format file size in human-readable format
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.1} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.1} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.1} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}
