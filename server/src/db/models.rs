//! Rust types mirroring database rows and their JSON views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Convert a stored Unix-millisecond timestamp.
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Per-message delivery lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// Initial status at send time: delivered only when the receiver holds
    /// at least one live session.
    pub fn initial(receiver_online: bool) -> Self {
        if receiver_online {
            Self::Delivered
        } else {
            Self::Sent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            _ => None,
        }
    }
}

/// Full user row, including the password hash. Never serialized.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub profile_pic: String,
    pub about: String,
    pub last_seen: i64,
    pub created_at: i64,
}

/// Public profile projection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub profile_pic: String,
    pub about: String,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRow> for PublicUser {
    fn from(row: &UserRow) -> Self {
        Self {
            id: row.id.clone(),
            full_name: row.full_name.clone(),
            email: row.email.clone(),
            profile_pic: row.profile_pic.clone(),
            about: row.about.clone(),
            last_seen: from_millis(row.last_seen),
            created_at: from_millis(row.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub reply_to: Option<String>,
    pub status: MessageStatus,
    pub is_deleted: bool,
    pub created_at: i64,
}

impl MessageRow {
    /// True when the message was exchanged between `a` and `b`, either way.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b) || (self.sender_id == b && self.receiver_id == a)
    }
}

/// Shallow projection of a replied-to message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyPreview {
    pub id: String,
    pub sender_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub is_deleted: bool,
}

impl From<&MessageRow> for ReplyPreview {
    fn from(row: &MessageRow) -> Self {
        Self {
            id: row.id.clone(),
            sender_id: row.sender_id.clone(),
            text: row.text.clone(),
            image: row.image.clone(),
            is_deleted: row.is_deleted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub reply_to_id: Option<String>,
    /// Absent when the referenced message cannot be resolved.
    pub reply_to: Option<ReplyPreview>,
    pub status: MessageStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn new(row: MessageRow, reply_to: Option<ReplyPreview>) -> Self {
        Self {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            text: row.text,
            image: row.image,
            reply_to_id: row.reply_to,
            reply_to,
            status: row.status,
            is_deleted: row.is_deleted,
            created_at: from_millis(row.created_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryKind {
    Text,
    Image,
}

impl StoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryRow {
    pub id: String,
    pub owner_id: String,
    pub kind: StoryKind,
    pub content: String,
    pub bg_color: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryOwner {
    pub id: String,
    pub full_name: String,
    pub profile_pic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryView {
    pub id: String,
    pub owner: StoryOwner,
    pub kind: StoryKind,
    pub content: String,
    pub bg_color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub viewed_by: Vec<String>,
}
