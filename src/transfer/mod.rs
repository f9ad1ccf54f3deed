//! Upload and download flows built on the session pool

pub mod downloader;
pub mod filter;
pub mod handler;
pub mod seen;
pub mod uploader;

pub use downloader::{DownloadSettings, Downloader, PollOutcome, PollReport};
pub use filter::FilterPattern;
pub use handler::{BroadcastHandler, LoggingHandler, TransferHandler, TransferRecord};
pub use seen::SeenSet;
pub use uploader::{BasenameGenerator, FileNameGenerator, UploadRecord, Uploader};
