//! Registry of live sessions

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use jsshd_core::time::utc_timestamp;
use jsshd_core::SessionId;

/// Tracks every session that is currently running
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Sessions indexed by session ID
    sessions: DashMap<SessionId, SessionInfo>,
}

/// What is known about a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Login name presented by the client
    pub user: String,
    /// Remote peer address
    pub remote_addr: SocketAddr,
    /// When the session was registered (RFC 3339)
    pub started_at: String,
}

impl SessionRegistry {
    /// Create a new session registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an identifier not held by any live session and register it.
    ///
    /// The session stays registered until the returned lease is dropped.
    pub fn register(self: &Arc<Self>, user: &str, remote_addr: SocketAddr) -> SessionLease {
        let info = SessionInfo {
            user: user.to_string(),
            remote_addr,
            started_at: utc_timestamp(),
        };

        loop {
            let id = SessionId::generate();
            if let Entry::Vacant(entry) = self.sessions.entry(id) {
                entry.insert(info);
                tracing::debug!("Registered session {} for {}", id, user);
                return SessionLease {
                    id,
                    registry: Arc::clone(self),
                };
            }
        }
    }

    /// Get a live session by ID
    pub fn get(&self, id: &SessionId) -> Option<SessionInfo> {
        self.sessions.get(id).map(|r| r.value().clone())
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Keeps a session registered while held
#[derive(Debug)]
pub struct SessionLease {
    id: SessionId,
    registry: Arc<SessionRegistry>,
}

impl SessionLease {
    /// The allocated session ID
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.sessions.remove(&self.id);
        tracing::debug!("Unregistered session {}", self.id);
    }
}
