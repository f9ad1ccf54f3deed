//! SSH connection plumbing: credentials and host key verification.

pub mod auth;
pub mod handler;

pub use auth::Credential;
pub use handler::{ClientHandler, HostKeyPolicy};
