//! Presence: which users are reachable right now, and transient typing state.

pub mod registry;
pub mod typing;

pub use registry::{Departure, PresenceRegistry, Session};
pub use typing::TypingTracker;

/// Transport-assigned id of one live connection.
pub type SessionId = uuid::Uuid;
