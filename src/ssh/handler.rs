use std::future::Future;
use std::path::PathBuf;

use russh::client::Handler;
use russh::keys::{self, HashAlg, PublicKey};

use crate::error::SshError;
use crate::security_log;

/// How server host keys are verified
#[derive(Debug, Clone, Default)]
pub struct HostKeyPolicy {
    /// Accept (and learn, when a known_hosts file is configured) keys never seen before
    pub allow_unknown_keys: bool,
    pub known_hosts: Option<PathBuf>,
}

impl HostKeyPolicy {
    pub fn new(allow_unknown_keys: bool, known_hosts: Option<PathBuf>) -> Self {
        Self {
            allow_unknown_keys,
            known_hosts,
        }
    }
}

/// Outcome of checking a key against the policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyDecision {
    Accept,
    AcceptAndLearn,
    Reject(String),
}

/// SSH client handler implementation
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, policy: HostKeyPolicy) -> Self {
        Self { host, port, policy }
    }
}

/// Decide whether to trust `key` for `host:port`.
pub fn decide(policy: &HostKeyPolicy, host: &str, port: u16, key: &PublicKey) -> HostKeyDecision {
    let Some(path) = &policy.known_hosts else {
        return if policy.allow_unknown_keys {
            HostKeyDecision::Accept
        } else {
            HostKeyDecision::Reject("no known_hosts file configured".to_string())
        };
    };

    match keys::known_hosts::check_known_hosts_path(host, port, key, path) {
        Ok(true) => HostKeyDecision::Accept,
        Ok(false) if policy.allow_unknown_keys => HostKeyDecision::AcceptAndLearn,
        Ok(false) => HostKeyDecision::Reject(format!("unknown host key for {}:{}", host, port)),
        Err(keys::Error::KeyChanged { line }) => HostKeyDecision::Reject(format!(
            "host key for {}:{} changed (known_hosts line {})",
            host, port, line
        )),
        Err(e) if policy.allow_unknown_keys => {
            tracing::warn!("Could not read known_hosts {}: {}", path.display(), e);
            HostKeyDecision::Accept
        }
        Err(e) => HostKeyDecision::Reject(format!(
            "could not read known_hosts {}: {}",
            path.display(),
            e
        )),
    }
}

impl Handler for ClientHandler {
    type Error = SshError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let host = self.host.clone();
        let port = self.port;
        let policy = self.policy.clone();
        let key = server_public_key.clone();

        async move {
            let fingerprint = key.fingerprint(HashAlg::Sha256).to_string();
            let decision = tokio::task::spawn_blocking({
                let host = host.clone();
                let key = key.clone();
                let policy = policy.clone();
                move || decide(&policy, &host, port, &key)
            })
            .await
            .map_err(|e| SshError::HostKeyVerification(format!("Host key check failed: {}", e)))?;

            match decision {
                HostKeyDecision::Accept => {
                    tracing::debug!("Host key accepted for {}:{} ({})", host, port, fingerprint);
                    Ok(true)
                }
                HostKeyDecision::AcceptAndLearn => {
                    security_log::log_host_key_learned(&host, port, &fingerprint);
                    if let Some(path) = policy.known_hosts {
                        let learned = tokio::task::spawn_blocking(move || {
                            keys::known_hosts::learn_known_hosts_path(&host, port, &key, &path)
                        })
                        .await;
                        match learned {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => tracing::warn!("Failed to record host key: {}", e),
                            Err(e) => tracing::warn!("Host key store task failed: {}", e),
                        }
                    }
                    Ok(true)
                }
                HostKeyDecision::Reject(reason) => {
                    security_log::log_host_key_rejected(&host, port, &reason);
                    Err(SshError::HostKeyVerification(reason))
                }
            }
        }
    }
}
