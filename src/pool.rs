//! Pool of browser sessions, one per egress identity.
//!
//! Sessions are launched once at startup and reused for the lifetime of the
//! process. A session is checked out exclusively for the duration of a
//! render: `acquire()` hands out a [`SessionLease`] that returns the session
//! to the pool when dropped. Idle sessions are picked round-robin so
//! consecutive searches rotate through the configured egress paths.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::session::{BrowserSession, SessionLauncher};
use crate::{EgressIdentity, Result, SearchError};

/// Default time `acquire()` waits for a session to become idle.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Slots {
    busy: Vec<bool>,
    next: usize,
}

impl Slots {
    fn new(len: usize) -> Self {
        Self {
            busy: vec![false; len],
            next: 0,
        }
    }

    /// Marks the first idle slot at or after the cursor as busy.
    fn checkout(&mut self) -> Option<usize> {
        let len = self.busy.len();
        let index = (0..len)
            .map(|offset| (self.next + offset) % len)
            .find(|&i| !self.busy[i])?;
        self.busy[index] = true;
        self.next = (index + 1) % len;
        Some(index)
    }

    fn release(&mut self, index: usize) {
        if let Some(slot) = self.busy.get_mut(index) {
            *slot = false;
        }
    }
}

/// Fixed set of browser sessions with exclusive, round-robin checkout.
pub struct EgressPool {
    sessions: Vec<Arc<dyn BrowserSession>>,
    slots: Arc<Mutex<Slots>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl EgressPool {
    /// Launches one session per identity.
    ///
    /// Identities are launched in order. A proxy identity that fails to
    /// launch is logged and skipped; a direct identity that fails aborts
    /// startup.
    pub async fn start(
        launcher: &dyn SessionLauncher,
        identities: Vec<EgressIdentity>,
    ) -> Result<Self> {
        let mut sessions = Vec::with_capacity(identities.len());

        for identity in &identities {
            info!("Launching browser session for {}", identity);
            match launcher.launch(identity).await {
                Ok(session) => sessions.push(session),
                Err(e) if identity.is_direct() => {
                    for session in &sessions {
                        close_quietly(session.as_ref()).await;
                    }
                    return Err(e);
                }
                Err(e) => {
                    warn!("Failed to launch browser session for {}: {}", identity, e);
                }
            }
        }

        let pool = Self::from_sessions(sessions)?;
        info!("Browser pool ready: {} sessions", pool.len());
        Ok(pool)
    }

    /// Builds a pool from already running sessions.
    pub fn from_sessions(sessions: Vec<Arc<dyn BrowserSession>>) -> Result<Self> {
        if sessions.is_empty() {
            return Err(SearchError::NoSessions);
        }
        let len = sessions.len();
        Ok(Self {
            sessions,
            slots: Arc::new(Mutex::new(Slots::new(len))),
            permits: Arc::new(Semaphore::new(len)),
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        })
    }

    /// Sets how long `acquire()` waits when every session is checked out.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Number of sessions in the pool.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Always false; a pool cannot be built without sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions not currently checked out.
    pub fn idle(&self) -> usize {
        self.permits.available_permits()
    }

    /// Identities of the running sessions, in pool order.
    pub fn identities(&self) -> Vec<EgressIdentity> {
        self.sessions.iter().map(|s| s.identity().clone()).collect()
    }

    /// Checks out the next idle session.
    ///
    /// Waits up to the acquire timeout for a session to be returned when all
    /// of them are in use.
    pub async fn acquire(&self) -> Result<SessionLease> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| SearchError::PoolExhausted(self.acquire_timeout.as_secs()))?
        .map_err(|_| SearchError::ServiceUnavailable("browser pool is shut down".to_string()))?;

        let index = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .checkout()
            .ok_or_else(|| SearchError::Other("no idle session despite free permit".to_string()))?;

        let session = Arc::clone(&self.sessions[index]);
        debug!("Checked out session {} ({})", index, session.identity());

        Ok(SessionLease {
            index,
            session,
            slots: Arc::clone(&self.slots),
            _permit: permit,
        })
    }

    /// Closes every session. Later `acquire()` calls fail.
    pub async fn shutdown_all(&self) {
        self.permits.close();
        for session in &self.sessions {
            close_quietly(session.as_ref()).await;
        }
        info!("Browser pool shut down");
    }
}

impl fmt::Debug for EgressPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EgressPool")
            .field("sessions", &self.identities())
            .field("idle", &self.idle())
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

async fn close_quietly(session: &dyn BrowserSession) {
    if let Err(e) = session.close().await {
        warn!("Failed to close browser session {}: {}", session.identity(), e);
    }
}

/// Exclusive handle on a pooled session. Returns it to the pool on drop.
pub struct SessionLease {
    index: usize,
    session: Arc<dyn BrowserSession>,
    slots: Arc<Mutex<Slots>>,
    _permit: OwnedSemaphorePermit,
}

impl SessionLease {
    /// The leased session.
    pub fn session(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }

    /// Position of the session in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Identity of the leased session.
    pub fn identity(&self) -> &EgressIdentity {
        self.session.identity()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release(self.index);
        debug!("Returned session {} to pool", self.index);
    }
}
