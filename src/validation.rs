//! Input validation for configured endpoints and remote file names.
//!
//! Hostnames and usernames are checked once when the configuration is loaded.
//! Remote file names are checked for every listed entry before it is turned
//! into a local path.

use std::net::IpAddr;

use regex::Regex;
use std::sync::LazyLock;

/// Validation error with field context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

static DNS_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").expect("static regex")
});

// SFTP servers commonly accept dotted and e-mail style account names
static USERNAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9_.@-]{0,63}$").expect("static regex")
});

/// Validate a hostname (DNS name or IP address).
///
/// Accepts IPv4, IPv6 and RFC 1123 DNS hostnames.
pub fn validate_hostname(hostname: &str) -> Result<(), ValidationError> {
    let hostname = hostname.trim();

    if hostname.is_empty() {
        return Err(ValidationError::new("connection.host", "Hostname is required"));
    }

    // DNS max is 253 characters
    if hostname.len() > 253 {
        return Err(ValidationError::new(
            "connection.host",
            "Hostname exceeds maximum length of 253 characters",
        ));
    }

    if hostname.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    for label in hostname.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ValidationError::new(
                "connection.host",
                "Hostname labels must be 1-63 characters",
            ));
        }

        if !DNS_LABEL_REGEX.is_match(label) {
            return Err(ValidationError::new(
                "connection.host",
                format!(
                    "Invalid hostname label '{}': must start and end with alphanumeric, may contain hyphens",
                    label
                ),
            ));
        }
    }

    Ok(())
}

/// Validate the login name used for the SFTP account.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::new("connection.user", "Username is required"));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::new(
            "connection.user",
            "Username must be at most 64 characters of letters, digits, '_', '-', '.' or '@'",
        ));
    }

    Ok(())
}

/// Check that a name from a remote listing is safe to use as a local file name.
///
/// Rejects anything that could escape the download directory.
pub fn validate_remote_file_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError::new("file", format!("'{}' is not a file name", name)));
    }

    if name.contains(['/', '\\', '\0']) {
        return Err(ValidationError::new(
            "file",
            format!("'{}' contains a path separator", name.escape_default()),
        ));
    }

    Ok(())
}
