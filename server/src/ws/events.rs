//! Closed catalog of WebSocket events.
//!
//! Frames are JSON text: `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::db::models::{MessageView, StoryView};
use crate::error::ErrorKind;

/// Events the server pushes to sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    OnlineUsers { user_ids: Vec<String> },
    UserOnline { user_id: String },
    UserOffline { user_id: String },
    NewMessage { message: MessageView },
    MessagesRead { read_by: String },
    MessagesDelivered { message_ids: Vec<String> },
    MessageDeleted { message_id: String, delete_for: DeleteScope },
    UserTyping { sender_id: String },
    UserStopTyping { sender_id: String },
    NewStory { story: StoryView },
    StoryDeleted { story_id: String, user_id: String },
    Error { kind: ErrorKind, message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OnlineUsers { .. } => "online_users",
            Self::UserOnline { .. } => "user_online",
            Self::UserOffline { .. } => "user_offline",
            Self::NewMessage { .. } => "new_message",
            Self::MessagesRead { .. } => "messages_read",
            Self::MessagesDelivered { .. } => "messages_delivered",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::UserTyping { .. } => "user_typing",
            Self::UserStopTyping { .. } => "user_stop_typing",
            Self::NewStory { .. } => "new_story",
            Self::StoryDeleted { .. } => "story_deleted",
            Self::Error { .. } => "error",
        }
    }
}

/// Events clients send over their session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Typing { receiver_id: String },
    StopTyping { receiver_id: String },
    MarkRead { sender_id: String },
    MessageDelivered { message_ids: Vec<String> },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    #[default]
    Me,
    Everyone,
}
