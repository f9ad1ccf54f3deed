//! SFTP transport for the bridge
//!
//! Provides the russh-backed connector and session plus the traits the rest
//! of the crate is written against.

pub mod client;
pub mod session;
pub mod transport;
pub mod types;

pub use client::SftpConnector;
pub use session::SftpSession;
pub use transport::{Connector, RemoteSession};
pub use types::{EntryKind, RemoteEntry, format_size, remote_join};
