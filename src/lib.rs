//! SFTP file bridge
//!
//! Uploads local files to a remote directory and polls a remote directory
//! for files matching a glob, downloading and then deleting them.
//!
//! The entry point is [`SftpBridge`]. Lower layers are public so the pool,
//! uploader and downloader can be driven directly or over a custom
//! [`sftp::Connector`].

pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod scheduler;
pub mod sftp;
pub mod ssh;
pub mod transfer;
pub mod validation;

pub(crate) mod security_log;

pub use bridge::SftpBridge;
pub use config::BridgeConfig;
pub use error::{ConfigError, SftpError};
pub use transfer::{PollOutcome, PollReport, TransferRecord, UploadRecord};
