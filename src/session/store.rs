//! Session store
//!
//! Maps opaque session ids to the principal that authenticated them.
//! Sessions expire after a fixed idle period: every successful validation
//! refreshes the idle clock, an expired entry is evicted lazily on access
//! and by the periodic sweep.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::shutdown::ShutdownSignal;

/// Default idle timeout (one hour)
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(3_600_000);

/// Authenticated identity bound to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_photo_url: Option<String>,
}

#[derive(Debug)]
struct SessionEntry {
    principal: Principal,
    last_activity: Instant,
}

/// Concurrent in-memory session table
pub struct SessionStore {
    sessions: DashMap<String, SessionEntry>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a session for `principal` and return its fresh id
    pub fn create_session(&self, principal: Principal) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        debug!(user_id = %principal.user_id, "Created session");
        self.sessions.insert(
            session_id.clone(),
            SessionEntry {
                principal,
                last_activity: Instant::now(),
            },
        );
        session_id
    }

    /// Resolve a session id to its principal, refreshing the idle clock
    ///
    /// Returns `None` for a missing, unknown or idle-expired id. An expired
    /// entry is removed as a side effect.
    pub fn validate_session(&self, session_id: Option<&str>) -> Option<Principal> {
        let session_id = session_id?;
        let now = Instant::now();

        {
            let mut entry = self.sessions.get_mut(session_id)?;
            if !self.is_expired(&entry, now) {
                entry.last_activity = now;
                return Some(entry.principal.clone());
            }
        }

        // Guard lock released above; re-check so a concurrent refresh wins
        if self
            .sessions
            .remove_if(session_id, |_, entry| self.is_expired(entry, now))
            .is_some()
        {
            debug!("Evicted idle session on access");
        }
        None
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn invalidate_session(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            debug!("Invalidated session");
        }
    }

    /// Remove every idle-expired session, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.sessions.retain(|_, entry| {
            let keep = !self.is_expired(entry, now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of live entries (may include not-yet-swept expired ones)
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    fn is_expired(&self, entry: &SessionEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_activity) > self.timeout
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT)
    }
}

/// Spawn the background sweep, stopping when `shutdown` fires
pub fn spawn_sweep_task(
    store: Arc<SessionStore>,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    info!("Session sweep task started (every {:?})", interval);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.recv() => break,
            }
            let removed = store.sweep_expired();
            if removed > 0 {
                info!("Session sweep: removed {} idle sessions", removed);
            }
            debug!("Session sweep: {} active", store.active_count());
        }
        debug!("Session sweep task stopped");
    })
}
