//! In-memory map of user identity -> live transport sessions.
//!
//! The registry is the only shared mutable structure of the real-time core.
//! Both indexes (by session, by user) sit behind one lock so a register or
//! unregister is observed atomically, including the online/offline
//! transition it causes. Nothing here is persisted; clients re-register
//! after a restart.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};

use crate::error::TransportError;
use crate::ws::ConnectionSender;

use super::SessionId;

/// One live transport connection bound to a user.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub connected_at: DateTime<Utc>,
    sender: ConnectionSender,
}

/// Result of removing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub user_id: String,
    /// True when the removed session was the user's last one.
    pub went_offline: bool,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    by_user: HashMap<String, HashSet<SessionId>>,
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: RwLock<Inner>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind `session_id` to `user_id`. Returns true if the user was offline
    /// before this call.
    pub fn register(&self, user_id: &str, session_id: SessionId, sender: ConnectionSender) -> bool {
        let mut inner = self.write();
        let session = Session {
            id: session_id,
            user_id: user_id.to_string(),
            connected_at: Utc::now(),
            sender,
        };
        // Re-registering an id under another user moves it.
        if let Some(previous) = inner.sessions.insert(session_id, session) {
            if previous.user_id != user_id {
                remove_from_user(&mut inner.by_user, &previous.user_id, session_id);
            }
        }
        let sessions = inner.by_user.entry(user_id.to_string()).or_default();
        let was_offline = sessions.is_empty();
        sessions.insert(session_id);

        tracing::debug!(
            user_id = %user_id,
            session_id = %session_id,
            connections = sessions.len(),
            "Session registered"
        );
        was_offline
    }

    /// Remove exactly one session. A stale disconnect for an old session
    /// never evicts a newer session of the same user.
    pub fn unregister(&self, session_id: SessionId) -> Option<Departure> {
        let mut inner = self.write();
        let session = inner.sessions.remove(&session_id)?;
        let went_offline = remove_from_user(&mut inner.by_user, &session.user_id, session_id);

        tracing::debug!(
            user_id = %session.user_id,
            session_id = %session_id,
            went_offline,
            connected_secs = (Utc::now() - session.connected_at).num_seconds(),
            "Session unregistered"
        );
        Some(Departure {
            user_id: session.user_id,
            went_offline,
        })
    }

    pub fn sessions_for(&self, user_id: &str) -> HashSet<SessionId> {
        self.read().by_user.get(user_id).cloned().unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.read()
            .by_user
            .get(user_id)
            .map(|sessions| !sessions.is_empty())
            .unwrap_or(false)
    }

    /// Current roster, sorted for stable snapshots.
    pub fn online_user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().by_user.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Push a frame to one session.
    pub fn push(&self, session_id: SessionId, msg: Message) -> Result<(), TransportError> {
        let sender = self
            .read()
            .sessions
            .get(&session_id)
            .map(|s| s.sender.clone())
            .ok_or(TransportError(session_id))?;
        sender.send(msg).map_err(|_| TransportError(session_id))
    }

    /// Snapshot of the sessions matching `filter`, taken under the lock and
    /// released before any send happens.
    pub(crate) fn targets<F>(&self, filter: F) -> Vec<SessionId>
    where
        F: Fn(&Session) -> bool,
    {
        self.read()
            .sessions
            .values()
            .filter(|s| filter(s))
            .map(|s| s.id)
            .collect()
    }
}

/// Returns true when the user has no sessions left.
fn remove_from_user(
    by_user: &mut HashMap<String, HashSet<SessionId>>,
    user_id: &str,
    session_id: SessionId,
) -> bool {
    let Some(sessions) = by_user.get_mut(user_id) else {
        return false;
    };
    sessions.remove(&session_id);
    if sessions.is_empty() {
        by_user.remove(user_id);
        true
    } else {
        false
    }
}
