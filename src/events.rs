//! Wire contract for the realtime channel.
//!
//! Frames are JSON objects of the form `{"event": <name>, "payload": <object>}`.
//! Event names are namespaced (`call:*`, `message:*`, `typing:*`,
//! `conversation:*`, `user:*`); the router dispatches on the namespace.

use crate::models::{CallType, CallerInfo, Message, MessageType, Reaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Consolidated session-description bundle relayed between peers. Trickle is
/// disabled, so each side produces exactly one of these per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload(pub Value);

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInitiatePayload {
    pub conversation_id: String,
    pub call_type: CallType,
    pub receiver_id: String,
    pub caller_info: CallerInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIncomingPayload {
    pub from: String,
    pub conversation_id: String,
    pub call_type: CallType,
    pub caller_info: CallerInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswerPayload {
    pub conversation_id: String,
    pub caller_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEndPayload {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRelayPayload {
    pub signal: SignalPayload,
    pub to: String,
    pub from: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendPayload {
    pub conversation_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReceivedPayload {
    #[serde(default)]
    pub success: bool,
    pub data: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReactPayload {
    pub message_id: String,
    pub emoji: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReactionPayload {
    pub message_id: String,
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedPayload {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl TypingPayload {
    /// Identity the indicator is tracked under. Servers that only relay the
    /// username still get a usable key.
    pub fn who(&self) -> Option<&str> {
        self.user_id.as_deref().or(self.username.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub conversation_id: String,
}

// ============================================================================
// Outbound events
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    CallInitiate(CallInitiatePayload),
    CallAccept(CallAnswerPayload),
    CallReject(CallAnswerPayload),
    CallEnd(CallEndPayload),
    WebrtcSignal(SignalRelayPayload),
    MessageSend(MessageSendPayload),
    MessageReact(MessageReactPayload),
    TypingStart(TypingPayload),
    TypingStop(TypingPayload),
    ConversationJoin(RoomPayload),
    ConversationLeave(RoomPayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallInitiate(_) => "call:initiate",
            Self::CallAccept(_) => "call:accept",
            Self::CallReject(_) => "call:reject",
            Self::CallEnd(_) => "call:end",
            Self::WebrtcSignal(_) => "webrtc:signal",
            Self::MessageSend(_) => "message:send",
            Self::MessageReact(_) => "message:react",
            Self::TypingStart(_) => "typing:start",
            Self::TypingStop(_) => "typing:stop",
            Self::ConversationJoin(_) => "conversation:join",
            Self::ConversationLeave(_) => "conversation:leave",
        }
    }

    pub fn to_frame(&self) -> Value {
        let payload = match self {
            Self::CallInitiate(p) => serde_json::to_value(p),
            Self::CallAccept(p) | Self::CallReject(p) => serde_json::to_value(p),
            Self::CallEnd(p) => serde_json::to_value(p),
            Self::WebrtcSignal(p) => serde_json::to_value(p),
            Self::MessageSend(p) => serde_json::to_value(p),
            Self::MessageReact(p) => serde_json::to_value(p),
            Self::TypingStart(p) | Self::TypingStop(p) => serde_json::to_value(p),
            Self::ConversationJoin(p) | Self::ConversationLeave(p) => serde_json::to_value(p),
        }
        .unwrap_or(Value::Null);

        json!({ "event": self.name(), "payload": payload })
    }
}

// ============================================================================
// Inbound events
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    CallIncoming(CallIncomingPayload),
    CallAccepted,
    CallAccept(CallAnswerPayload),
    CallReject(CallAnswerPayload),
    CallEnd(CallEndPayload),
    WebrtcSignal(SignalRelayPayload),
    MessageReceived(MessageReceivedPayload),
    MessageReaction(MessageReactionPayload),
    MessageDeleted(MessageDeletedPayload),
    TypingStart(TypingPayload),
    TypingStop(TypingPayload),
    UserOnline(PresencePayload),
    UserOffline(PresencePayload),
}

impl ServerEvent {
    /// Parse one inbound event. Unknown names and malformed payloads yield
    /// `None`; the transport drops them.
    pub fn parse(name: &str, payload: Value) -> Option<Self> {
        let event = match name {
            "call:incoming" => Self::CallIncoming(serde_json::from_value(payload).ok()?),
            "call:accepted" => Self::CallAccepted,
            "call:accept" => Self::CallAccept(serde_json::from_value(payload).ok()?),
            "call:reject" => Self::CallReject(serde_json::from_value(payload).ok()?),
            "call:end" => Self::CallEnd(serde_json::from_value(payload).ok()?),
            "webrtc:signal" => Self::WebrtcSignal(serde_json::from_value(payload).ok()?),
            "message:received" => Self::MessageReceived(serde_json::from_value(payload).ok()?),
            "message:reaction" => Self::MessageReaction(serde_json::from_value(payload).ok()?),
            "message:deleted" => Self::MessageDeleted(serde_json::from_value(payload).ok()?),
            "typing:start" => Self::TypingStart(serde_json::from_value(payload).ok()?),
            "typing:stop" => Self::TypingStop(serde_json::from_value(payload).ok()?),
            "user:online" => Self::UserOnline(serde_json::from_value(payload).ok()?),
            "user:offline" => Self::UserOffline(serde_json::from_value(payload).ok()?),
            _ => return None,
        };
        Some(event)
    }

    pub fn from_frame(frame: &Value) -> Option<Self> {
        let name = frame.get("event")?.as_str()?;
        let payload = frame.get("payload").cloned().unwrap_or(Value::Null);
        Self::parse(name, payload)
    }
}
