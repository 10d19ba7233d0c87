//! Data models for VoxChat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// Users
// ============================================================================

/// Reference to a user identity. Never owned by the entities that carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(alias = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Identity attached to call events so the callee can render the caller
/// before any profile fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerInfo {
    #[serde(alias = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Gif,
    Audio,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Gif => "gif",
            Self::Audio => "audio",
        }
    }
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub user: String,
}

/// The message a reply points at. Arrives either hydrated or as a bare id
/// stub that the UI resolves against the loaded message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyTo {
    Hydrated(Box<Message>),
    Stub {
        #[serde(alias = "_id")]
        id: String,
    },
}

impl ReplyTo {
    pub fn id(&self) -> &str {
        match self {
            Self::Hydrated(message) => &message.id,
            Self::Stub { id } => id,
        }
    }
}

/// Immutable once created; only `reactions` and `deleted` mutate in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "conversation")]
    pub conversation_id: String,
    pub sender: UserRef,
    pub content: String,
    /// Absent on legacy plain-text messages.
    #[serde(default)]
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTo>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub read_by: HashSet<String>,
    #[serde(default)]
    pub deleted: bool,
}

// ============================================================================
// Conversations
// ============================================================================

/// Denormalized summary of the newest message, kept on the conversation so
/// the sidebar renders without loading the thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    #[serde(alias = "_id")]
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            sender_id: message.sender.id.clone(),
            content: message.content.clone(),
            message_type: message.message_type,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(alias = "_id")]
    pub id: String,
    pub participants: Vec<UserRef>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Calls
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Voice,
    Video,
}

impl CallType {
    pub fn has_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Idle,
    /// Outgoing call published, waiting for the remote party.
    Connecting,
    /// Incoming call, ringtone playing.
    Ringing,
    /// Both sides agreed; peer connections are being negotiated.
    Accepted,
    /// Remote media arrived.
    Connected,
    Ended,
    Rejected,
    Failed,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Rejected | Self::Failed)
    }
}
