//! Client facade
//!
//! `SftpBridge` wires the session pool, uploader, downloader and poll trigger
//! from a [`BridgeConfig`] and owns their lifecycles.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::BridgeConfig;
use crate::config::paths::expand_tilde;
use crate::error::{ConfigError, SftpError};
use crate::pool::{PoolSettings, SessionPool};
use crate::scheduler::{PollSchedule, PollTrigger};
use crate::sftp::{Connector, SftpConnector};
use crate::transfer::{
    BroadcastHandler, DownloadSettings, Downloader, FileNameGenerator, PollOutcome, SeenSet,
    TransferHandler, TransferRecord, UploadRecord, Uploader,
};

/// Buffered records per subscriber before slow receivers start lagging
const EVENT_CAPACITY: usize = 256;

pub struct SftpBridge {
    pool: Arc<SessionPool>,
    uploader: Uploader,
    downloader: Arc<Downloader>,
    schedule: PollSchedule,
    events: BroadcastHandler,
    trigger: Mutex<Option<PollTrigger>>,
}

impl std::fmt::Debug for SftpBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpBridge")
            .field("endpoint", &self.pool.endpoint())
            .field("schedule", &self.schedule.to_string())
            .field("running", &self.is_running())
            .finish()
    }
}

impl SftpBridge {
    /// Build a bridge that talks to the configured server over SSH.
    pub fn new(config: &BridgeConfig) -> Result<Self, ConfigError> {
        let connector = SftpConnector::from_config(&config.connection)?;
        Self::with_connector(config, Arc::new(connector))
    }

    /// Build a bridge on top of any transport.
    pub fn with_connector(
        config: &BridgeConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ConfigError> {
        let download = DownloadSettings::from_config(&config.download)?;
        let schedule = config.download.poll_schedule()?;

        let seen = match &config.download.seen_store {
            Some(path) => SeenSet::open(expand_tilde(&path.to_string_lossy()))?,
            None => SeenSet::in_memory(),
        };

        let pool = Arc::new(SessionPool::new(connector, PoolSettings::from(&config.pool)));
        let uploader = Uploader::new(pool.clone(), config.upload.remote_directory.clone());
        let downloader = Arc::new(Downloader::new(pool.clone(), download, Arc::new(seen)));

        let events = BroadcastHandler::new(EVENT_CAPACITY);
        downloader.add_handler(Arc::new(events.clone()));

        Ok(Self {
            pool,
            uploader,
            downloader,
            schedule,
            events,
            trigger: Mutex::new(None),
        })
    }

    /// Replace the basename naming used for uploads.
    pub fn with_name_generator(mut self, naming: Arc<dyn FileNameGenerator>) -> Self {
        self.uploader = self.uploader.with_name_generator(naming);
        self
    }

    pub async fn upload(&self, path: impl AsRef<Path>) -> Result<UploadRecord, SftpError> {
        self.uploader.upload(path.as_ref()).await
    }

    /// Receive a record for every completed download.
    pub fn subscribe(&self) -> broadcast::Receiver<TransferRecord> {
        self.events.subscribe()
    }

    /// Register a handler. Handlers added after `start` see subsequent passes.
    pub fn add_handler(&self, handler: Arc<dyn TransferHandler>) {
        self.downloader.add_handler(handler);
    }

    /// Run one pass now. Returns `Skipped` if the trigger's pass is running.
    pub async fn poll_now(&self) -> Result<PollOutcome, SftpError> {
        self.downloader.poll_once().await
    }

    /// Start the poll trigger. Returns false if it was already running.
    pub fn start(&self) -> bool {
        let mut trigger = self.trigger.lock();
        if trigger.as_ref().is_some_and(PollTrigger::is_running) {
            return false;
        }
        *trigger = Some(PollTrigger::start(
            self.downloader.clone(),
            self.schedule.clone(),
        ));
        true
    }

    /// Stop polling, let an in-flight pass finish and close idle sessions.
    pub async fn stop(&self) {
        let trigger = self.trigger.lock().take();
        if let Some(trigger) = trigger {
            trigger.stop().await;
        }
        self.downloader.wait_idle().await;
        self.pool.close().await;
        tracing::info!(endpoint = %self.pool.endpoint(), "Bridge stopped");
    }

    pub fn is_running(&self) -> bool {
        self.trigger
            .lock()
            .as_ref()
            .is_some_and(PollTrigger::is_running)
    }

    pub fn schedule(&self) -> &PollSchedule {
        &self.schedule
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn seen(&self) -> &SeenSet {
        self.downloader.seen()
    }
}
