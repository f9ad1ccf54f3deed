//! Docker-based SFTP test fixtures

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Once};
use std::time::Duration;

use secrecy::SecretString;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, timeout};

use sftp_bridge::BridgeConfig;
use sftp_bridge::sftp::SftpConnector;
use sftp_bridge::ssh::{Credential, HostKeyPolicy};

// Ensure Docker containers are started only once per test run
static DOCKER_INIT: Once = Once::new();
static DOCKER_AVAILABLE: AtomicBool = AtomicBool::new(false);

// Tests share the server's directories
static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Configuration for the test SFTP server
#[derive(Debug, Clone)]
pub struct TestSftpServer {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for TestSftpServer {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2222,
            username: "testuser".to_string(),
            password: "testpass123".to_string(),
        }
    }
}

/// Start Docker containers for SFTP testing
pub fn ensure_docker_started() {
    DOCKER_INIT.call_once(|| {
        let docker_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/docker");

        if Command::new("docker").arg("--version").output().is_err() {
            eprintln!("WARNING: Docker not available, SFTP integration tests will be skipped");
            return;
        }

        let status = if Command::new("docker")
            .args(["compose", "version"])
            .output()
            .is_ok_and(|o| o.status.success())
        {
            Command::new("docker")
                .current_dir(&docker_dir)
                .args(["compose", "up", "-d", "--wait"])
                .status()
        } else if Command::new("docker-compose")
            .arg("--version")
            .output()
            .is_ok()
        {
            Command::new("docker-compose")
                .current_dir(&docker_dir)
                .args(["up", "-d", "--wait"])
                .status()
        } else {
            eprintln!("WARNING: docker compose not available");
            return;
        };

        match status {
            Ok(s) if s.success() => {
                DOCKER_AVAILABLE.store(true, Ordering::SeqCst);
                eprintln!("SFTP test container started successfully");
            }
            Ok(s) => {
                eprintln!("Failed to start SFTP test container: exit code {:?}", s.code());
            }
            Err(e) => {
                eprintln!("Failed to start SFTP test container: {}", e);
            }
        }
    });
}

/// Check if Docker containers are running
pub fn is_docker_available() -> bool {
    ensure_docker_started();
    DOCKER_AVAILABLE.load(Ordering::SeqCst)
}

/// Serialize tests that touch the server's directories
pub async fn acquire_test_lock() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().await
}

/// Wait for the SFTP server to accept TCP connections
pub async fn wait_for_sftp_ready(host: &str, port: u16) -> Result<(), String> {
    let addr = format!("{}:{}", host, port);
    let max_attempts = 30;

    for _ in 0..max_attempts {
        if let Ok(Ok(_)) = timeout(Duration::from_secs(2), TcpStream::connect(&addr)).await {
            return Ok(());
        }
        sleep(Duration::from_millis(200)).await;
    }

    Err(format!("SFTP server not ready after {} attempts", max_attempts))
}

/// Test environment with isolated local directories and known_hosts
pub struct SftpTestEnvironment {
    pub server: TestSftpServer,
    pub work_dir: TempDir,
    pub known_hosts_path: PathBuf,
}

impl SftpTestEnvironment {
    pub async fn new() -> Result<Self, String> {
        if !is_docker_available() {
            return Err("Docker not available".to_string());
        }

        let server = TestSftpServer::default();
        wait_for_sftp_ready(&server.host, server.port).await?;

        let work_dir = TempDir::new().map_err(|e| format!("Failed to create temp dir: {}", e))?;
        let known_hosts_path = work_dir.path().join("known_hosts");

        Ok(Self {
            server,
            work_dir,
            known_hosts_path,
        })
    }

    pub fn password(&self) -> Credential {
        Credential::Password(SecretString::from(self.server.password.clone()))
    }

    /// Connector that accepts any host key
    pub fn connector(&self) -> SftpConnector {
        self.connector_with(self.password())
    }

    pub fn connector_with(&self, credential: Credential) -> SftpConnector {
        SftpConnector::new(
            self.server.host.clone(),
            self.server.port,
            self.server.username.clone(),
            credential,
        )
        .with_connection_timeout(Duration::from_secs(10))
    }

    pub fn strict_connector(&self) -> SftpConnector {
        self.connector()
            .with_host_key_policy(HostKeyPolicy::new(false, Some(self.known_hosts_path.clone())))
    }

    pub fn learning_connector(&self) -> SftpConnector {
        self.connector()
            .with_host_key_policy(HostKeyPolicy::new(true, Some(self.known_hosts_path.clone())))
    }

    pub fn local_dir(&self) -> PathBuf {
        self.work_dir.path().join("localDownload")
    }

    pub fn bridge_config(&self, filter: &str) -> BridgeConfig {
        let toml = format!(
            r#"
            [connection]
            host = "{}"
            port = {}
            user = "{}"
            password = "{}"

            [upload]
            remote_directory = "/inbox"

            [download]
            remote_directory = "/inbox"
            filter = "{}"
            local_directory = {:?}
            "#,
            self.server.host,
            self.server.port,
            self.server.username,
            self.server.password,
            filter,
            self.local_dir().to_string_lossy()
        );
        BridgeConfig::from_toml_str(&toml).expect("integration config must be valid")
    }
}

/// Macro to skip tests when Docker is not available
#[macro_export]
macro_rules! skip_if_no_docker {
    () => {
        if !super::fixtures::is_docker_available() {
            eprintln!("Skipping test: Docker not available");
            return;
        }
    };
}
