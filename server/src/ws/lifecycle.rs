//! Per-connection lifecycle: `Connecting -> Authenticated -> Active -> Closed`.
//!
//! Entering `Active` registers the session and announces presence; leaving
//! it unregisters exactly that session, so a stale disconnect can never
//! evict a newer session of the same user.

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;

use crate::auth::jwt;
use crate::db::{self, users};
use crate::presence::{Departure, SessionId};
use crate::state::AppState;
use crate::ws::broadcast::{broadcast_except_user, broadcast_roster, broadcast_to_all};
use crate::ws::events::ServerEvent;
use crate::ws::ConnectionSender;

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token missing or invalid
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
pub const CLOSE_TOKEN_INVALID: u16 = 4002;

/// Connecting is the handshake in [`authenticate`]; a [`Lifecycle`] exists
/// only once it succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authenticated,
    Active,
    Closed,
}

/// Why a handshake was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub close_code: u16,
    pub reason: &'static str,
}

/// `Connecting -> Authenticated`: resolve the handshake token to a user id.
/// Connections without a verifiable identity are refused.
pub fn authenticate(secret: &[u8], token: Option<&str>) -> Result<String, Refusal> {
    let token = token.filter(|t| !t.is_empty()).ok_or(Refusal {
        close_code: CLOSE_TOKEN_INVALID,
        reason: "Token missing",
    })?;
    jwt::validate_access_token(secret, token)
        .map(|claims| claims.sub)
        .map_err(|err| match err.kind() {
            JwtErrorKind::ExpiredSignature => Refusal {
                close_code: CLOSE_TOKEN_EXPIRED,
                reason: "Token expired",
            },
            _ => Refusal {
                close_code: CLOSE_TOKEN_INVALID,
                reason: "Token invalid",
            },
        })
}

pub struct Lifecycle {
    session_id: SessionId,
    user_id: String,
    phase: Phase,
}

impl Lifecycle {
    /// A connection whose identity has been verified.
    pub fn authenticated(user_id: String) -> Self {
        Self {
            session_id: uuid::Uuid::now_v7(),
            user_id,
            phase: Phase::Authenticated,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// `Authenticated -> Active`: register the session, send the roster
    /// snapshot to everyone (this session included), and announce the user
    /// to everyone else if this is their first live session.
    pub fn activate(&mut self, state: &AppState, sender: ConnectionSender) {
        if self.phase != Phase::Authenticated {
            return;
        }
        let came_online = state.presence.register(&self.user_id, self.session_id, sender);
        self.phase = Phase::Active;

        broadcast_roster(&state.presence);
        if came_online {
            broadcast_except_user(
                &state.presence,
                &self.user_id,
                &ServerEvent::UserOnline {
                    user_id: self.user_id.clone(),
                },
            );
        }
        tracing::info!(
            user_id = %self.user_id,
            session_id = %self.session_id,
            came_online,
            "Session active"
        );
    }

    /// `Active -> Closed`. Terminal and idempotent. When the user's last
    /// session goes, broadcast the roster and the offline event, close any
    /// typing indicators they left open, and stamp last-seen. The stamp is
    /// best-effort: a failure is logged and teardown continues.
    pub async fn close(&mut self, state: &AppState) {
        if self.phase != Phase::Active {
            self.phase = Phase::Closed;
            return;
        }
        self.phase = Phase::Closed;

        let Some(departure) = state.presence.unregister(self.session_id) else {
            return;
        };
        tracing::info!(
            user_id = %departure.user_id,
            session_id = %self.session_id,
            went_offline = departure.went_offline,
            "Session closed"
        );
        if !announce_departure(state, &departure) {
            return;
        }

        let user_id = departure.user_id;
        let uid = user_id.clone();
        match db::run(&state.db, move |conn| users::touch_last_seen(conn, &uid, db::now_millis())).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(user_id = %user_id, "Last-seen not stamped: user missing"),
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Failed to stamp last-seen"),
        }
    }
}

/// Broadcast the roster and `user_offline` for a departure that left the
/// user without sessions, and close their typing indicators. A user who
/// registered a new session since the unregister is not announced.
fn announce_departure(state: &AppState, departure: &Departure) -> bool {
    if !departure.went_offline {
        return false;
    }
    if state.presence.is_online(&departure.user_id) {
        tracing::debug!(user_id = %departure.user_id, "Reconnected before teardown, offline not announced");
        return false;
    }

    broadcast_roster(&state.presence);
    broadcast_to_all(
        &state.presence,
        &ServerEvent::UserOffline {
            user_id: departure.user_id.clone(),
        },
    );
    state.typing.sender_gone(&departure.user_id);
    true
}
