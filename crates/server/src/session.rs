//! Session registry
//!
//! Tracks live WebSocket sessions and enforces `server.max_sessions`. A
//! session is registered before the upgrade completes and removed when its
//! `SessionGuard` drops, however the connection ends.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::ServerError;

/// Public view of a live session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub started_at: DateTime<Utc>,
}

/// Live sessions keyed by id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionInfo>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a new session, or fail if the registry is full
    pub fn register(self: &Arc<Self>) -> Result<SessionGuard, ServerError> {
        let mut sessions = self.sessions.write();

        if sessions.len() >= self.max_sessions {
            tracing::warn!(active = sessions.len(), "Rejecting session: limit reached");
            return Err(ServerError::SessionLimit(sessions.len()));
        }

        let info = SessionInfo {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
        };
        sessions.insert(info.id.clone(), info.clone());
        tracing::debug!(session_id = %info.id, active = sessions.len(), "Session registered");

        Ok(SessionGuard {
            id: info.id,
            registry: Arc::clone(self),
        })
    }

    /// Live sessions, oldest first
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    fn remove(&self, id: &str) {
        if self.sessions.write().remove(id).is_some() {
            tracing::debug!(session_id = %id, "Session removed");
        }
    }
}

/// Keeps a session registered while alive
pub struct SessionGuard {
    id: String,
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
