//! Security event logging for audit trails.
//!
//! Authentication attempts, session establishment and host key decisions are
//! logged with `target: "security"` so they can be filtered separately:
//!
//! ```bash
//! RUST_LOG=security=info sftp-bridge run
//! ```

use tracing::{info, warn};

pub fn log_auth_attempt(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_attempt",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication attempt"
    );
}

pub fn log_auth_success(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_success",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication succeeded"
    );
}

pub fn log_auth_failure(host: &str, port: u16, username: &str, method: &str, reason: &str) {
    warn!(
        target: "security",
        event = "auth_failure",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        reason = %reason,
        "SSH authentication failed"
    );
}

/// Log an SFTP session establishment.
pub fn log_sftp_connect(host: &str, port: u16, username: &str) {
    info!(
        target: "security",
        event = "sftp_connect",
        host = %host,
        port = port,
        username = %username,
        "SFTP session established"
    );
}

/// Log an SFTP session teardown.
pub fn log_sftp_disconnect(host: &str, port: u16, reason: &str) {
    info!(
        target: "security",
        event = "sftp_disconnect",
        host = %host,
        port = port,
        reason = %reason,
        "SFTP session closed"
    );
}

/// Log a previously unknown host key being trusted.
pub fn log_host_key_learned(host: &str, port: u16, fingerprint: &str) {
    warn!(
        target: "security",
        event = "host_key_learned",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        "Accepted unknown host key"
    );
}

pub fn log_host_key_rejected(host: &str, port: u16, reason: &str) {
    warn!(
        target: "security",
        event = "host_key_rejected",
        host = %host,
        port = port,
        reason = %reason,
        "Host key rejected"
    );
}
