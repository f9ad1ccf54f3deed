//! SFTP client for establishing connections

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config};
use russh_sftp::client::SftpSession as RusshSftpSession;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::ConnectionConfig;
use crate::error::{ConfigError, SftpError};
use crate::security_log;
use crate::ssh::auth::{Credential, ResolvedAuth};
use crate::ssh::{ClientHandler, HostKeyPolicy};

use super::session::SftpSession;
use super::transport::{Connector, RemoteSession};

/// Opens authenticated SFTP sessions to one server
pub struct SftpConnector {
    config: Arc<Config>,
    host: String,
    port: u16,
    username: String,
    credential: Credential,
    policy: HostKeyPolicy,
    connection_timeout: Duration,
}

impl std::fmt::Debug for SftpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("method", &self.credential.method_name())
            .finish_non_exhaustive()
    }
}

impl SftpConnector {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            config: Arc::new(client_config(60)),
            host: host.into(),
            port,
            username: username.into(),
            credential,
            policy: HostKeyPolicy::new(true, None),
            connection_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(connection: &ConnectionConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            config: Arc::new(client_config(connection.keepalive_interval_secs)),
            host: connection.host.clone(),
            port: connection.port,
            username: connection.user.clone(),
            credential: connection.credential()?,
            policy: HostKeyPolicy::new(
                connection.allow_unknown_keys,
                connection.known_hosts.clone(),
            ),
            connection_timeout: connection.connect_timeout(),
        })
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_connection_timeout(mut self, connection_timeout: Duration) -> Self {
        self.connection_timeout = connection_timeout;
        self
    }

    /// Internal helper to establish the SFTP session after TCP connection
    async fn establish_sftp_session(&self, stream: TcpStream) -> Result<SftpSession, SftpError> {
        let handler = ClientHandler::new(self.host.clone(), self.port, self.policy.clone());

        let mut handle = client::connect_stream(self.config.clone(), stream, handler)
            .await
            .map_err(|e| {
                SftpError::Connect(format!(
                    "SSH handshake failed for {}:{}: {}",
                    self.host, self.port, e
                ))
            })?;

        self.authenticate(&mut handle).await?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SftpError::Connect(format!("Failed to open channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SftpError::Connect(format!("Failed to request SFTP subsystem: {}", e)))?;

        let sftp = RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| {
                SftpError::Connect(format!("Failed to initialize SFTP session: {}", e))
            })?;

        security_log::log_sftp_connect(&self.host, self.port, &self.username);

        Ok(SftpSession::new(
            sftp,
            handle,
            self.host.clone(),
            self.port,
            self.connection_timeout,
        ))
    }

    async fn authenticate(
        &self,
        handle: &mut client::Handle<ClientHandler>,
    ) -> Result<(), SftpError> {
        let method_name = self.credential.method_name();
        let (hostname, port, username) = (self.host.as_str(), self.port, self.username.as_str());

        security_log::log_auth_attempt(hostname, port, username, method_name);

        let auth = match ResolvedAuth::resolve(&self.credential).await {
            Ok(auth) => auth,
            Err(e) => {
                security_log::log_auth_failure(
                    hostname,
                    port,
                    username,
                    method_name,
                    &e.to_string(),
                );
                return Err(e.into());
            }
        };

        let auth_result = match auth {
            ResolvedAuth::Password(password) => handle
                .authenticate_password(username, password.expose_secret())
                .await
                .map_err(|e| format!("Password auth failed: {}", e)),
            ResolvedAuth::PublicKey(key) => handle
                .authenticate_publickey(username, key)
                .await
                .map_err(|e| format!("Public key auth failed: {}", e)),
        };

        let auth_result = match auth_result {
            Ok(result) => result,
            Err(reason) => {
                security_log::log_auth_failure(hostname, port, username, method_name, &reason);
                return Err(SftpError::Connect(reason));
            }
        };

        if !auth_result.success() {
            let reason = "Authentication rejected by server";
            security_log::log_auth_failure(hostname, port, username, method_name, reason);
            return Err(SftpError::Authentication(format!(
                "{} for {}@{}:{}",
                reason, username, hostname, port
            )));
        }

        security_log::log_auth_success(hostname, port, username, method_name);
        Ok(())
    }
}

#[async_trait]
impl Connector for SftpConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, SftpError> {
        let addr = format!("{}:{}", self.host, self.port);

        let stream = timeout(self.connection_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SftpError::Connect(format!("Connection timed out to {}", addr)))?
            .map_err(|e| SftpError::Connect(format!("Failed to connect to {}: {}", addr, e)))?;

        match timeout(self.connection_timeout, self.establish_sftp_session(stream)).await {
            Ok(result) => result.map(|session| Box::new(session) as Box<dyn RemoteSession>),
            Err(_) => Err(SftpError::Connect(format!(
                "SFTP session setup timed out for {}",
                addr
            ))),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

fn client_config(keepalive_interval: u64) -> Config {
    // Treat 0 as "no keepalive" to avoid immediate timeout
    let keepalive = if keepalive_interval == 0 {
        None
    } else {
        Some(Duration::from_secs(keepalive_interval))
    };

    Config {
        inactivity_timeout: Some(Duration::from_secs(3600)),
        keepalive_interval: keepalive,
        keepalive_max: 3,
        ..Default::default()
    }
}
