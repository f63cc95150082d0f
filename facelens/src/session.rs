//! Active session bookkeeping

use crate::FaceLensError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// What a session drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    /// Media playback into a surface
    Playback,
    /// Camera preview
    Camera,
}

/// Registry entry for an active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier
    pub id: Uuid,
    /// What the session drives
    pub kind: SessionKind,
    /// Source URI or camera label
    pub label: String,
    /// When the session was registered
    pub started_at: DateTime<Utc>,
}

/// Bounded set of active sessions shared by all handles of a `FaceLens`
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, SessionInfo>>,
    limit: usize,
}

impl SessionRegistry {
    /// Create a registry holding at most `limit` sessions
    pub fn new(limit: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            limit,
        }
    }

    /// Register a new session
    ///
    /// Fails with `SessionLimitExceeded` when the registry is full.
    pub fn register(&self, kind: SessionKind, label: &str) -> Result<SessionInfo, FaceLensError> {
        if self.sessions.len() >= self.limit {
            warn!(
                "Refusing {:?} session for {}: {} sessions active",
                kind,
                label,
                self.sessions.len()
            );
            return Err(FaceLensError::SessionLimitExceeded { limit: self.limit });
        }

        let info = SessionInfo {
            id: Uuid::new_v4(),
            kind,
            label: label.to_string(),
            started_at: Utc::now(),
        };
        self.sessions.insert(info.id, info.clone());
        debug!("Registered {:?} session {} ({})", kind, info.id, label);
        Ok(info)
    }

    /// Remove a session. Returns whether it was registered.
    pub fn unregister(&self, id: Uuid) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            debug!("Unregistered session {}", id);
        }
        removed
    }

    /// Look up a session
    pub fn get(&self, id: Uuid) -> Result<SessionInfo, FaceLensError> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FaceLensError::SessionNotFound {
                session_id: id.to_string(),
            })
    }

    /// Snapshot of all active sessions
    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is active
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Maximum number of concurrent sessions
    pub fn limit(&self) -> usize {
        self.limit
    }
}
