use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// SSH-related errors raised while establishing a session
#[derive(Error, Debug)]
pub enum SshError {
    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("Key file {0} is encrypted and requires a passphrase")]
    KeyFilePassphraseRequired(PathBuf),

    #[error("Invalid passphrase for key file {0}")]
    KeyFilePassphraseInvalid(PathBuf),

    #[error("Host key verification failed: {0}")]
    HostKeyVerification(String),

    #[error("russh error: {0}")]
    Russh(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::Russh(err.to_string())
    }
}

/// Errors surfaced by the bridge's upload and download paths
#[derive(Error, Debug)]
pub enum SftpError {
    /// Host unreachable, handshake failure or timeout
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Credentials rejected by the server
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Upload called with something that is not an existing regular file
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// I/O or protocol failure while moving bytes
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Remote directory listing failed
    #[error("Listing failed: {0}")]
    List(String),

    #[error("Local I/O error: {0}")]
    LocalIo(String),
}

impl SftpError {
    /// Whether the error means the underlying session is broken.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, SftpError::Connect(_) | SftpError::Authentication(_))
    }
}

impl From<SshError> for SftpError {
    fn from(err: SshError) -> Self {
        match err {
            SshError::KeyFile(_)
            | SshError::KeyFilePassphraseRequired(_)
            | SshError::KeyFilePassphraseInvalid(_) => SftpError::Authentication(err.to_string()),
            SshError::HostKeyVerification(_) | SshError::Russh(_) => {
                SftpError::Connect(err.to_string())
            }
        }
    }
}
