//! Event routing: translate a logical event target into concrete sessions
//! through the presence registry and push with at-most-once semantics.
//!
//! Every function returns the number of sessions the frame was handed to.
//! Unreachable sessions are logged and skipped; nothing is retried.

use std::collections::HashSet;

use axum::extract::ws::Message;

use crate::presence::{PresenceRegistry, Session, SessionId};
use crate::ws::events::ServerEvent;

/// Encode an event as a JSON text frame.
pub fn encode_event(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::warn!(event = event.name(), error = %e, "Failed to encode event");
            None
        }
    }
}

fn deliver(registry: &PresenceRegistry, targets: Vec<SessionId>, event: &ServerEvent) -> usize {
    if targets.is_empty() {
        return 0;
    }
    let Some(msg) = encode_event(event) else {
        return 0;
    };

    let mut delivered = 0;
    for session_id in targets {
        match registry.push(session_id, msg.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::debug!(event = event.name(), error = %e, "Dropped push");
            }
        }
    }
    delivered
}

/// Send an event to one session.
pub fn send_to_session(registry: &PresenceRegistry, session_id: SessionId, event: &ServerEvent) -> usize {
    deliver(registry, vec![session_id], event)
}

/// Send an event to every session of a user. Offline users get nothing.
pub fn send_to_user(registry: &PresenceRegistry, user_id: &str, event: &ServerEvent) -> usize {
    deliver(registry, registry.sessions_for(user_id).into_iter().collect(), event)
}

/// Send an event to every connected session.
pub fn broadcast_to_all(registry: &PresenceRegistry, event: &ServerEvent) -> usize {
    deliver(registry, registry.targets(|_| true), event)
}

/// Send an event to every connected session not owned by `user_id`.
pub fn broadcast_except_user(registry: &PresenceRegistry, user_id: &str, event: &ServerEvent) -> usize {
    deliver(registry, registry.targets(|s: &Session| s.user_id != user_id), event)
}

/// Send an event to every connected session whose user is not in `excluded`.
pub fn broadcast_excluding(registry: &PresenceRegistry, excluded: &HashSet<String>, event: &ServerEvent) -> usize {
    deliver(registry, registry.targets(|s: &Session| !excluded.contains(&s.user_id)), event)
}

/// Full roster snapshot to every session.
pub fn broadcast_roster(registry: &PresenceRegistry) -> usize {
    let event = ServerEvent::OnlineUsers {
        user_ids: registry.online_user_ids(),
    };
    broadcast_to_all(registry, &event)
}
