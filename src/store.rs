//! Conversation and message state.
//!
//! One conversation is selected at a time; selecting another clears the
//! loaded thread and any pending reply draft. Sent messages are not inserted
//! optimistically - they show up when the server echo arrives.

use crate::events::{
    ClientEvent, MessageReceivedPayload, MessageSendPayload, RoomPayload, TypingPayload,
};
use crate::models::{Conversation, LastMessage, Message, MessageType, Reaction};
use crate::transport::EventSink;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct ChatStore {
    sink: Arc<dyn EventSink>,
    self_username: Option<String>,
    typing_debounce: Duration,

    conversations: Vec<Conversation>,
    selected: Option<String>,
    messages: Vec<Message>,
    reply_draft: Option<Message>,

    /// conversation id -> typist -> expiry deadline
    typing: HashMap<String, HashMap<String, Instant>>,
    /// Outbound debounce: set after `typing:start`, cleared on the stop edge.
    typing_active: bool,
    typing_stop_deadline: Option<Instant>,
}

impl ChatStore {
    pub fn new(
        sink: Arc<dyn EventSink>,
        self_username: Option<String>,
        typing_debounce: Duration,
    ) -> Self {
        Self {
            sink,
            self_username,
            typing_debounce,
            conversations: Vec::new(),
            selected: None,
            messages: Vec::new(),
            reply_draft: None,
            typing: HashMap::new(),
            typing_active: false,
            typing_stop_deadline: None,
        }
    }

    // ============= Accessors =============

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        let id = self.selected.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn reply_draft(&self) -> Option<&Message> {
        self.reply_draft.as_ref()
    }

    /// Unexpired typists for a conversation.
    pub fn typing_users(&self, conversation_id: &str) -> Vec<&str> {
        self.typing
            .get(conversation_id)
            .map(|users| users.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    // ============= Conversation list =============

    pub fn set_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        self.sort_conversations();
    }

    /// Switch the active thread. Leaves the previous room, clears the loaded
    /// messages and reply draft, cancels any pending outbound typing state,
    /// and joins the new room.
    pub fn select_conversation(&mut self, conversation_id: Option<&str>) {
        if let Some(previous) = self.selected.take() {
            self.flush_typing_stop(&previous);
            self.emit(ClientEvent::ConversationLeave(RoomPayload {
                conversation_id: previous,
            }));
        }

        self.messages.clear();
        self.reply_draft = None;

        if let Some(id) = conversation_id {
            self.selected = Some(id.to_string());
            self.emit(ClientEvent::ConversationJoin(RoomPayload {
                conversation_id: id.to_string(),
            }));
        }
    }

    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    // ============= Composition =============

    /// Publish a message. The thread updates when the `message:received`
    /// echo comes back; nothing is inserted locally.
    pub fn send_message(&mut self, content: &str, message_type: MessageType) {
        let Some(conversation_id) = self.selected.clone() else {
            tracing::warn!("send_message with no conversation selected");
            return;
        };

        let reply_to = self.reply_draft.take().map(|m| m.id);
        self.emit(ClientEvent::MessageSend(MessageSendPayload {
            conversation_id: conversation_id.clone(),
            content: content.to_string(),
            message_type,
            reply_to,
        }));

        // Sending ends the current typing period immediately
        self.flush_typing_stop(&conversation_id);
    }

    pub fn set_reply_draft(&mut self, message: Message) {
        self.reply_draft = Some(message);
    }

    pub fn clear_reply_draft(&mut self) {
        self.reply_draft = None;
    }

    /// Add or replace our reaction on a message.
    pub fn react(&mut self, message_id: &str, emoji: &str) {
        let Some(conversation_id) = self.selected.clone() else {
            return;
        };
        self.emit(ClientEvent::MessageReact(crate::events::MessageReactPayload {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            conversation_id,
        }));
    }

    /// Called on every keystroke. The first one in an idle period publishes
    /// `typing:start`; redundant starts are suppressed; `typing:stop` fires
    /// from `poll_timers` once the debounce window passes without another
    /// keystroke.
    pub fn mark_typing(&mut self) {
        let Some(conversation_id) = self.selected.clone() else {
            return;
        };

        if !self.typing_active {
            self.typing_active = true;
            self.emit(ClientEvent::TypingStart(TypingPayload {
                conversation_id,
                username: self.self_username.clone(),
                user_id: None,
            }));
        }
        self.typing_stop_deadline = Some(Instant::now() + self.typing_debounce);
    }

    // ============= Inbound events =============

    /// `message:received` echo/broadcast. Appends to the open thread when it
    /// matches and patches the conversation summary in place - no refetch.
    pub fn handle_message_received(&mut self, payload: MessageReceivedPayload) {
        let message = match payload {
            MessageReceivedPayload {
                success: true,
                data: Some(message),
            } => message,
            _ => {
                tracing::warn!("dropping unsuccessful message:received");
                return;
            }
        };

        if self.selected.as_deref() == Some(message.conversation_id.as_str())
            && !self.messages.iter().any(|m| m.id == message.id)
        {
            self.messages.push(message.clone());
        }

        // The sender of a fresh message is no longer typing
        if let Some(typists) = self.typing.get_mut(&message.conversation_id) {
            typists.remove(&message.sender.id);
            typists.remove(&message.sender.username);
        }

        self.patch_conversation_summary(&message);
    }

    /// `message:reaction` replaces the full list for the addressed message
    /// (last-writer-wins at message granularity), so reapplying the same
    /// payload is idempotent.
    pub fn apply_reaction(&mut self, message_id: &str, reactions: Vec<Reaction>) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            message.reactions = reactions;
        }
    }

    /// `message:deleted` - messages are flagged, never removed from the list.
    pub fn handle_deleted(&mut self, message_id: &str) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            message.deleted = true;
        }
    }

    pub fn handle_typing_started(&mut self, payload: TypingPayload) {
        let Some(who) = payload.who().map(str::to_string) else {
            return;
        };
        self.typing
            .entry(payload.conversation_id)
            .or_default()
            .insert(who, Instant::now() + self.typing_debounce);
    }

    pub fn handle_typing_stopped(&mut self, payload: TypingPayload) {
        if let Some(typists) = self.typing.get_mut(&payload.conversation_id) {
            if let Some(who) = payload.who() {
                typists.remove(who);
            }
        }
    }

    // ============= Timers =============

    /// Fire the outbound typing-stop debounce and expire stale inbound
    /// indicators. Called once per event turn.
    pub fn poll_timers(&mut self, now: Instant) {
        if self.typing_active {
            if let Some(deadline) = self.typing_stop_deadline {
                if deadline <= now {
                    if let Some(conversation_id) = self.selected.clone() {
                        self.emit(ClientEvent::TypingStop(TypingPayload {
                            conversation_id,
                            username: None,
                            user_id: None,
                        }));
                    }
                    self.typing_active = false;
                    self.typing_stop_deadline = None;
                }
            }
        }

        for typists in self.typing.values_mut() {
            typists.retain(|_, expiry| *expiry > now);
        }
        self.typing.retain(|_, typists| !typists.is_empty());
    }

    // ============= Internals =============

    /// Publish `typing:stop` now if a typing period is open, and cancel the
    /// debounce timer.
    fn flush_typing_stop(&mut self, conversation_id: &str) {
        if self.typing_active {
            self.emit(ClientEvent::TypingStop(TypingPayload {
                conversation_id: conversation_id.to_string(),
                username: None,
                user_id: None,
            }));
        }
        self.typing_active = false;
        self.typing_stop_deadline = None;
    }

    /// Apply an inbound message as an incremental patch to the sidebar
    /// summary instead of refetching the whole list.
    fn patch_conversation_summary(&mut self, message: &Message) {
        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
        {
            conversation.last_message = Some(LastMessage::from(message));
            conversation.updated_at = message.created_at;
            self.sort_conversations();
        }
    }

    fn sort_conversations(&mut self) {
        self.conversations
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }

    fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.sink.emit(event) {
            tracing::debug!("emit failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::UserRef;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<ClientEvent>>);

    impl EventSink for RecordingSink {
        fn emit(&self, event: ClientEvent) -> Result<()> {
            self.0.lock().push(event);
            Ok(())
        }
    }

    impl RecordingSink {
        fn names(&self) -> Vec<&'static str> {
            self.0.lock().iter().map(|e| e.name()).collect()
        }

        fn events(&self) -> Vec<ClientEvent> {
            self.0.lock().clone()
        }
    }

    fn store() -> (Arc<RecordingSink>, ChatStore) {
        let sink = Arc::new(RecordingSink::default());
        let store = ChatStore::new(
            sink.clone(),
            Some("ada".to_string()),
            Duration::from_millis(2000),
        );
        (sink, store)
    }

    fn message(id: &str, conversation_id: &str, sender_id: &str, content: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender: UserRef {
                id: sender_id.to_string(),
                username: format!("user-{}", sender_id),
                avatar: None,
            },
            content: content.to_string(),
            message_type: MessageType::Text,
            created_at: chrono::Utc::now(),
            reply_to: None,
            reactions: Vec::new(),
            read_by: Default::default(),
            deleted: false,
        }
    }

    fn conversation(id: &str, updated_secs: i64) -> Conversation {
        Conversation {
            id: id.to_string(),
            participants: Vec::new(),
            is_group: false,
            last_message: None,
            updated_at: chrono::Utc.timestamp_opt(updated_secs, 0).single().unwrap(),
        }
    }

    fn received(message: Message) -> MessageReceivedPayload {
        MessageReceivedPayload {
            success: true,
            data: Some(message),
        }
    }

    #[test]
    fn test_select_conversation_joins_and_leaves_rooms() {
        let (sink, mut store) = store();
        store.select_conversation(Some("c1"));
        store.select_conversation(Some("c2"));

        assert_eq!(
            sink.names(),
            vec!["conversation:join", "conversation:leave", "conversation:join"]
        );
    }

    #[test]
    fn test_switching_conversation_clears_thread_and_draft() {
        let (_sink, mut store) = store();
        store.select_conversation(Some("c1"));
        store.set_messages(vec![message("m1", "c1", "u2", "hi")]);
        store.set_reply_draft(message("m1", "c1", "u2", "hi"));

        store.select_conversation(Some("c2"));

        assert!(store.messages().is_empty());
        assert!(store.reply_draft().is_none());
        assert_eq!(store.selected_id(), Some("c2"));
    }

    #[test]
    fn test_send_message_carries_reply_and_clears_draft() {
        let (sink, mut store) = store();
        store.select_conversation(Some("c1"));
        store.set_reply_draft(message("m7", "c1", "u2", "original"));

        store.send_message("a reply", MessageType::Text);

        let send = sink
            .events()
            .into_iter()
            .find_map(|e| match e {
                ClientEvent::MessageSend(p) => Some(p),
                _ => None,
            })
            .expect("message:send published");
        assert_eq!(send.conversation_id, "c1");
        assert_eq!(send.content, "a reply");
        assert_eq!(send.reply_to.as_deref(), Some("m7"));
        assert!(store.reply_draft().is_none());

        // No optimistic insertion
        assert!(store.messages().is_empty());
    }

    #[test]
    fn test_typing_start_suppressed_while_active() {
        let (sink, mut store) = store();
        store.select_conversation(Some("c1"));

        store.mark_typing();
        store.mark_typing();
        store.mark_typing();

        let starts = sink
            .names()
            .iter()
            .filter(|n| **n == "typing:start")
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_typing_stop_fires_once_after_debounce() {
        let (sink, mut store) = store();
        store.select_conversation(Some("c1"));

        store.mark_typing();
        let now = Instant::now();

        // Before the window closes: nothing
        store.poll_timers(now + Duration::from_millis(1500));
        assert!(!sink.names().contains(&"typing:stop"));

        // After: exactly one stop, and polling again stays quiet
        store.poll_timers(now + Duration::from_millis(2500));
        store.poll_timers(now + Duration::from_millis(3500));
        let stops = sink.names().iter().filter(|n| **n == "typing:stop").count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_keystroke_extends_debounce_window() {
        let (sink, mut store) = store();
        store.select_conversation(Some("c1"));

        store.mark_typing();
        store.poll_timers(Instant::now() + Duration::from_millis(1000));
        store.mark_typing(); // fresh keystroke resets the deadline

        store.poll_timers(Instant::now() + Duration::from_millis(1500));
        assert!(!sink.names().contains(&"typing:stop"));
    }

    #[test]
    fn test_send_flushes_typing_stop_immediately() {
        let (sink, mut store) = store();
        store.select_conversation(Some("c1"));

        store.mark_typing();
        store.send_message("done", MessageType::Text);

        assert!(sink.names().contains(&"typing:stop"));

        // Debounce is cancelled, no second stop later
        store.poll_timers(Instant::now() + Duration::from_secs(5));
        let stops = sink.names().iter().filter(|n| **n == "typing:stop").count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_inbound_typing_expires_after_window() {
        let (_sink, mut store) = store();
        store.handle_typing_started(TypingPayload {
            conversation_id: "c1".to_string(),
            username: Some("bob".to_string()),
            user_id: None,
        });
        assert_eq!(store.typing_users("c1"), vec!["bob"]);

        store.poll_timers(Instant::now() + Duration::from_secs(3));
        assert!(store.typing_users("c1").is_empty());
    }

    #[test]
    fn test_inbound_typing_stop_removes_typist() {
        let (_sink, mut store) = store();
        let payload = TypingPayload {
            conversation_id: "c1".to_string(),
            username: Some("bob".to_string()),
            user_id: None,
        };
        store.handle_typing_started(payload.clone());
        store.handle_typing_stopped(payload);
        assert!(store.typing_users("c1").is_empty());
    }

    #[test]
    fn test_message_received_appends_to_open_thread() {
        let (_sink, mut store) = store();
        store.set_conversations(vec![conversation("c1", 100)]);
        store.select_conversation(Some("c1"));

        store.handle_message_received(received(message("m1", "c1", "u2", "hello")));

        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].content, "hello");
    }

    #[test]
    fn test_message_received_is_deduplicated() {
        let (_sink, mut store) = store();
        store.select_conversation(Some("c1"));

        store.handle_message_received(received(message("m1", "c1", "u2", "hello")));
        store.handle_message_received(received(message("m1", "c1", "u2", "hello")));

        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn test_message_for_other_conversation_only_patches_summary() {
        let (_sink, mut store) = store();
        store.set_conversations(vec![conversation("c1", 200), conversation("c2", 100)]);
        store.select_conversation(Some("c1"));

        store.handle_message_received(received(message("m1", "c2", "u2", "psst")));

        assert!(store.messages().is_empty());
        // c2 got the summary patch and moved to the front
        assert_eq!(store.conversations()[0].id, "c2");
        let last = store.conversations()[0].last_message.as_ref().unwrap();
        assert_eq!(last.content, "psst");
    }

    #[test]
    fn test_unsuccessful_message_received_is_dropped() {
        let (_sink, mut store) = store();
        store.select_conversation(Some("c1"));
        store.handle_message_received(MessageReceivedPayload {
            success: false,
            data: None,
        });
        assert!(store.messages().is_empty());
    }

    #[test]
    fn test_reaction_replacement_is_idempotent() {
        let (_sink, mut store) = store();
        store.select_conversation(Some("c1"));
        store.handle_message_received(received(message("m1", "c1", "u2", "hello")));

        let reactions = vec![Reaction {
            emoji: "👍".to_string(),
            user: "u1".to_string(),
        }];
        store.apply_reaction("m1", reactions.clone());
        store.apply_reaction("m1", reactions.clone());

        assert_eq!(store.messages()[0].reactions, reactions);
    }

    #[test]
    fn test_deleted_flag_keeps_message_in_list() {
        let (_sink, mut store) = store();
        store.select_conversation(Some("c1"));
        store.handle_message_received(received(message("m1", "c1", "u2", "hello")));

        store.handle_deleted("m1");

        assert_eq!(store.messages().len(), 1);
        assert!(store.messages()[0].deleted);
    }

    #[test]
    fn test_react_publishes_for_selected_conversation() {
        let (sink, mut store) = store();
        store.select_conversation(Some("c1"));
        store.react("m1", "🔥");

        match sink.events().last() {
            Some(ClientEvent::MessageReact(p)) => {
                assert_eq!(p.message_id, "m1");
                assert_eq!(p.emoji, "🔥");
                assert_eq!(p.conversation_id, "c1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
