//! Caching session factory.
//!
//! Sessions are opened lazily through a [`Connector`], handed out one caller
//! at a time and parked in an idle list when released. Sequential callers
//! therefore share a single session; concurrent callers get their own, up to
//! `max_sessions`.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::config::PoolConfig;
use crate::error::SftpError;
use crate::sftp::{Connector, RemoteSession};

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_sessions: usize,
    pub idle_timeout: Duration,
    pub checkout_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            max_sessions: config.max_sessions.max(1),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            checkout_timeout: Duration::from_secs(config.checkout_timeout_secs),
        }
    }
}

struct IdleSession {
    session: Box<dyn RemoteSession>,
    since: Instant,
}

/// A session checked out of the pool.
///
/// Hand it back with [`SessionPool::release`] or [`SessionPool::invalidate`].
/// Dropping it instead frees the slot and closes the session.
pub struct PooledSession {
    session: Option<Box<dyn RemoteSession>>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("live", &self.session.is_some())
            .finish()
    }
}

impl Deref for PooledSession {
    type Target = dyn RemoteSession;

    fn deref(&self) -> &Self::Target {
        match &self.session {
            Some(session) => session.as_ref(),
            // Only release/invalidate take the session, and both consume self
            None => unreachable!("pooled session used after release"),
        }
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    session.close().await;
                });
            }
            Err(_) => {
                tracing::debug!("Pooled session dropped without a Tokio runtime; close skipped");
            }
        }
    }
}

pub struct SessionPool {
    connector: Arc<dyn Connector>,
    idle: Mutex<Vec<IdleSession>>,
    permits: Arc<Semaphore>,
    settings: PoolSettings,
    opened: AtomicUsize,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("endpoint", &self.connector.endpoint())
            .field("settings", &self.settings)
            .field("idle", &self.idle.lock().len())
            .finish()
    }
}

impl SessionPool {
    pub fn new(connector: Arc<dyn Connector>, settings: PoolSettings) -> Self {
        let settings = PoolSettings {
            max_sessions: settings.max_sessions.max(1),
            ..settings
        };
        Self {
            connector,
            idle: Mutex::new(Vec::new()),
            permits: Arc::new(Semaphore::new(settings.max_sessions)),
            settings,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    /// Check out a session, reusing an idle one when possible.
    pub async fn acquire(&self) -> Result<PooledSession, SftpError> {
        let permit = match timeout(
            self.settings.checkout_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(SftpError::Connect("session pool is closed".to_string())),
            Err(_) => {
                return Err(SftpError::Connect(format!(
                    "no session available for {} within {}s",
                    self.connector.endpoint(),
                    self.settings.checkout_timeout.as_secs()
                )));
            }
        };

        self.evict_idle().await;

        loop {
            // Most recently released first; it is the least likely to be stale
            let candidate = self.idle.lock().pop();
            match candidate {
                Some(idle) if idle.session.is_healthy() => {
                    return Ok(PooledSession {
                        session: Some(idle.session),
                        _permit: permit,
                    });
                }
                Some(idle) => {
                    tracing::debug!("Discarding broken idle session");
                    idle.session.close().await;
                }
                None => break,
            }
        }

        let session = self.connector.connect().await?;
        let opened = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            endpoint = %self.connector.endpoint(),
            opened,
            "Opened new SFTP session"
        );

        Ok(PooledSession {
            session: Some(session),
            _permit: permit,
        })
    }

    /// Return a session for reuse. Broken sessions are closed instead.
    pub async fn release(&self, mut pooled: PooledSession) {
        let Some(session) = pooled.session.take() else {
            return;
        };
        if session.is_healthy() {
            self.idle.lock().push(IdleSession {
                session,
                since: Instant::now(),
            });
        } else {
            tracing::debug!("Closing unhealthy session on release");
            session.close().await;
        }
        drop(pooled);
    }

    /// Close a session after a connection-level error so the next
    /// `acquire` reconnects.
    pub async fn invalidate(&self, mut pooled: PooledSession) {
        if let Some(session) = pooled.session.take() {
            tracing::debug!(endpoint = %self.connector.endpoint(), "Invalidating session");
            session.close().await;
        }
    }

    /// Release on success, invalidate on connection-level failure.
    pub async fn finish<T>(
        &self,
        pooled: PooledSession,
        result: &Result<T, SftpError>,
    ) {
        match result {
            Err(e) if e.is_connection_level() => self.invalidate(pooled).await,
            _ => self.release(pooled).await,
        }
    }

    /// Close idle sessions older than the idle timeout.
    pub async fn evict_idle(&self) -> usize {
        let expired: Vec<IdleSession> = {
            let mut idle = self.idle.lock();
            let (expired, keep): (Vec<_>, Vec<_>) = idle
                .drain(..)
                .partition(|s| s.since.elapsed() >= self.settings.idle_timeout);
            *idle = keep;
            expired
        };

        let count = expired.len();
        for idle in expired {
            idle.session.close().await;
        }
        if count > 0 {
            tracing::debug!(count, "Evicted idle sessions");
        }
        count
    }

    /// Close every idle session.
    pub async fn close(&self) {
        let idle: Vec<IdleSession> = self.idle.lock().drain(..).collect();
        for entry in idle {
            entry.session.close().await;
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of sessions opened through the connector so far
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}
