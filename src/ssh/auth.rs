use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::{HashAlg, PrivateKeyWithHashAlg};
use secrecy::{ExposeSecret, SecretString};

use crate::error::SshError;

/// Configured credential for the remote account
#[derive(Debug, Clone)]
pub enum Credential {
    Password(SecretString),
    PrivateKey {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
}

impl Credential {
    /// Name used in security log lines
    pub fn method_name(&self) -> &'static str {
        match self {
            Credential::Password(_) => "password",
            Credential::PrivateKey { .. } => "publickey",
        }
    }
}

/// Resolved authentication for an SSH connection
pub enum ResolvedAuth {
    /// Password authentication with zeroized secret string
    Password(SecretString),
    /// Public key authentication with loaded key
    PublicKey(PrivateKeyWithHashAlg),
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedAuth::Password(_) => f.debug_tuple("Password").field(&"[REDACTED]").finish(),
            ResolvedAuth::PublicKey(_) => f.debug_tuple("PublicKey").field(&"[KEY]").finish(),
        }
    }
}

impl ResolvedAuth {
    /// Turn a configured credential into something russh can authenticate with.
    pub async fn resolve(credential: &Credential) -> Result<Self, SshError> {
        match credential {
            Credential::Password(password) => Ok(ResolvedAuth::Password(password.clone())),
            Credential::PrivateKey { path, passphrase } => {
                let passphrase = passphrase.as_ref().map(|p| p.expose_secret());
                load_key_file(path, passphrase).await
            }
        }
    }
}

/// Load an SSH private key from file
async fn load_key_file(path: &Path, passphrase: Option<&str>) -> Result<ResolvedAuth, SshError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        SshError::KeyFile(format!("Cannot read key file {}: {}", path.display(), e))
    })?;

    let first_line = content.lines().next().unwrap_or("");
    if first_line.starts_with("ssh-") || first_line.starts_with("ecdsa-") {
        return Err(SshError::KeyFile(format!(
            "File {} contains a PUBLIC key, not a private key",
            path.display()
        )));
    }

    if !first_line.starts_with("-----BEGIN") {
        return Err(SshError::KeyFile(format!(
            "File {} does not appear to be a valid SSH private key",
            path.display()
        )));
    }

    let key = russh::keys::load_secret_key(path, passphrase).map_err(|e| {
        let normalized = e.to_string().to_lowercase();
        let is_passphrase_error = normalized.contains("encrypted")
            || normalized.contains("passphrase")
            || normalized.contains("cryptographic");
        if is_passphrase_error {
            if passphrase.is_some() {
                SshError::KeyFilePassphraseInvalid(path.to_path_buf())
            } else {
                SshError::KeyFilePassphraseRequired(path.to_path_buf())
            }
        } else {
            SshError::KeyFile(format!("Failed to load key {}: {}", path.display(), e))
        }
    })?;

    // RSA keys sign with SHA-512; other key types use their native algorithm
    let hash_alg = if key.algorithm().is_rsa() {
        Some(HashAlg::Sha512)
    } else {
        None
    };

    Ok(ResolvedAuth::PublicKey(PrivateKeyWithHashAlg::new(
        Arc::new(key),
        hash_alg,
    )))
}
