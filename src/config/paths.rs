use directories::ProjectDirs;
use std::path::PathBuf;

const CONFIG_ENV: &str = "SFTP_BRIDGE_CONFIG";
const LOG_DIR_ENV: &str = "SFTP_BRIDGE_LOG_DIR";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "sftp-bridge", "sftp-bridge")
        .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
}

/// Get the path to the bridge config file.
///
/// `SFTP_BRIDGE_CONFIG` takes precedence over the platform config directory.
pub fn config_file() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(CONFIG_ENV) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(expand_tilde(trimmed));
        }
    }
    config_dir().map(|dir| dir.join("bridge.toml"))
}

/// Default local directory for downloaded files
pub fn default_local_download_dir() -> PathBuf {
    std::env::temp_dir().join("localDownload")
}

/// Ensure the config directory exists with proper permissions
pub fn ensure_config_dir() -> std::io::Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine config directory",
        )
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        // Owner-only access on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
        }
    }

    Ok(dir)
}

/// Expand tilde in path (e.g., ~/.ssh/id_rsa -> /home/user/.ssh/id_rsa)
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
}

/// Get the log directory path
pub fn log_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(LOG_DIR_ENV) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        return Some(PathBuf::from(trimmed));
    }

    config_dir().map(|d| d.join("logs"))
}

/// Ensure the log directory exists with proper permissions
pub fn ensure_log_dir() -> std::io::Result<PathBuf> {
    if std::env::var_os(LOG_DIR_ENV).is_none() {
        ensure_config_dir()?;
    }

    let dir = log_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine log directory",
        )
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
        }
    }

    Ok(dir)
}
