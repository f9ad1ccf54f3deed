use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::scheduler::PollSchedule;
use crate::ssh::auth::Credential;
use crate::transfer::FilterPattern;
use crate::validation::{validate_hostname, validate_username};

/// Bridge settings stored in bridge.toml
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

impl BridgeConfig {
    /// Load from the default location (see `paths::config_file`)
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::paths::config_file().ok_or_else(|| ConfigError::ReadFile {
            path: PathBuf::from("bridge.toml"),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config file path",
            ),
        })?;
        Self::load_from(&path)
    }

    /// Load and validate a config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_hostname(&self.connection.host)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        validate_username(&self.connection.user)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.connection.port == 0 {
            return Err(ConfigError::Invalid("connection.port must be non-zero".into()));
        }
        if self.connection.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "connection.connect_timeout_secs must be at least 1".into(),
            ));
        }
        if self.connection.password.is_none() && self.connection.private_key.is_none() {
            return Err(ConfigError::Invalid(
                "either connection.password or connection.private_key must be set".into(),
            ));
        }
        if !self.connection.allow_unknown_keys && self.connection.known_hosts.is_none() {
            return Err(ConfigError::Invalid(
                "connection.known_hosts is required when allow_unknown_keys is false".into(),
            ));
        }
        if self.pool.max_sessions == 0 {
            return Err(ConfigError::Invalid("pool.max_sessions must be at least 1".into()));
        }
        self.download.filter_pattern()?;
        self.download.poll_schedule()?;
        Ok(())
    }
}

fn default_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_keepalive() -> u64 {
    60
}

/// Remote endpoint identity and credentials
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub private_key_passphrase: Option<SecretString>,
    #[serde(default = "default_true")]
    pub allow_unknown_keys: bool,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
}

impl ConnectionConfig {
    /// The active credential. A private key wins over a password.
    pub fn credential(&self) -> Result<Credential, ConfigError> {
        if let Some(key_path) = &self.private_key {
            return Ok(Credential::PrivateKey {
                path: super::paths::expand_tilde(&key_path.to_string_lossy()),
                passphrase: self.private_key_passphrase.clone(),
            });
        }
        match &self.password {
            Some(password) => Ok(Credential::Password(password.clone())),
            None => Err(ConfigError::Invalid("no credential configured".into())),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

fn default_max_sessions() -> usize {
    8
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_checkout_timeout() -> u64 {
    30
}

/// Session pool sizing
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_checkout_timeout")]
    pub checkout_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout(),
            checkout_timeout_secs: default_checkout_timeout(),
        }
    }
}

fn default_remote_dir() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_remote_dir")]
    pub remote_directory: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            remote_directory: default_remote_dir(),
        }
    }
}

fn default_filter() -> String {
    "*.*".to_string()
}

fn default_local_dir() -> PathBuf {
    super::paths::default_local_download_dir()
}

fn default_poll_interval() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_remote_dir")]
    pub remote_directory: String,
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default = "default_local_dir")]
    pub local_directory: PathBuf,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Six-field cron expression; overrides `poll_interval_secs` when set
    #[serde(default)]
    pub poll_cron: Option<String>,
    #[serde(default = "default_true")]
    pub delete_remote_files: bool,
    /// File that persists the seen set across restarts
    #[serde(default)]
    pub seen_store: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            remote_directory: default_remote_dir(),
            filter: default_filter(),
            local_directory: default_local_dir(),
            poll_interval_secs: default_poll_interval(),
            poll_cron: None,
            delete_remote_files: true,
            seen_store: None,
        }
    }
}

impl DownloadConfig {
    pub fn filter_pattern(&self) -> Result<FilterPattern, ConfigError> {
        FilterPattern::new(&self.filter)
            .map_err(|e| ConfigError::Invalid(format!("download.filter: {}", e)))
    }

    pub fn poll_schedule(&self) -> Result<PollSchedule, ConfigError> {
        match &self.poll_cron {
            Some(expr) => PollSchedule::cron(expr)
                .map_err(|e| ConfigError::Invalid(format!("download.poll_cron: {}", e))),
            None if self.poll_interval_secs == 0 => Err(ConfigError::Invalid(
                "download.poll_interval_secs must be at least 1".into(),
            )),
            None => Ok(PollSchedule::Interval(Duration::from_secs(
                self.poll_interval_secs,
            ))),
        }
    }
}
