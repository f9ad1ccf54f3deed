//! Consumers of completed downloads

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::sftp::format_size;

/// A file that was fully downloaded and renamed into place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub remote_path: String,
    pub local_path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
}

/// Called once per completed download, in transfer order.
///
/// Handlers run on the polling task; slow work should be handed off.
pub trait TransferHandler: Send + Sync {
    fn handle(&self, record: &TransferRecord);
}

/// Logs every completed download at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl TransferHandler for LoggingHandler {
    fn handle(&self, record: &TransferRecord) {
        tracing::info!(
            file = %record.filename,
            bytes = record.size,
            remote = %record.remote_path,
            local = %record.local_path.display(),
            "Received {} ({})",
            record.filename,
            format_size(record.size)
        );
    }
}

/// Forwards records to `broadcast` subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastHandler {
    sender: broadcast::Sender<TransferRecord>,
}

impl BroadcastHandler {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferRecord> {
        self.sender.subscribe()
    }
}

impl TransferHandler for BroadcastHandler {
    fn handle(&self, record: &TransferRecord) {
        // No subscribers is fine
        let _ = self.sender.send(record.clone());
    }
}

impl<F> TransferHandler for F
where
    F: Fn(&TransferRecord) + Send + Sync,
{
    fn handle(&self, record: &TransferRecord) {
        self(record)
    }
}
