pub mod actor;
pub mod broadcast;
pub mod events;
pub mod handler;
pub mod lifecycle;
pub mod protocol;

use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// The presence registry holds one per session to push frames to that client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;
