//! Inbound event dispatch.
//!
//! Glue between the transport queue and the stateful components: call events
//! go to the session manager, message/typing events to the store, presence to
//! the tracker. Runs on the single event-processing turn, one event at a time.

use crate::call::CallSessionManager;
use crate::events::ServerEvent;
use crate::presence::PresenceTracker;
use crate::store::ChatStore;

pub struct EventRouter;

impl EventRouter {
    pub fn dispatch(
        event: ServerEvent,
        calls: &mut CallSessionManager,
        store: &mut ChatStore,
        presence: &mut PresenceTracker,
    ) {
        match event {
            ServerEvent::CallIncoming(p) => calls.handle_incoming(p),
            ServerEvent::CallAccepted | ServerEvent::CallAccept(_) => calls.handle_remote_accepted(),
            ServerEvent::CallReject(p) => calls.handle_remote_rejected(&p.conversation_id),
            ServerEvent::CallEnd(p) => calls.handle_remote_end(&p.conversation_id),
            ServerEvent::WebrtcSignal(p) => calls.handle_signal(p),
            ServerEvent::MessageReceived(p) => store.handle_message_received(p),
            ServerEvent::MessageReaction(p) => store.apply_reaction(&p.message_id, p.reactions),
            ServerEvent::MessageDeleted(p) => store.handle_deleted(&p.message_id),
            ServerEvent::TypingStart(p) => store.handle_typing_started(p),
            ServerEvent::TypingStop(p) => store.handle_typing_stopped(p),
            ServerEvent::UserOnline(p) => presence.set_online(p.user_id),
            ServerEvent::UserOffline(p) => presence.set_offline(&p.user_id),
        }
    }

    /// The realtime channel dropped: presence is stale and a live call
    /// cannot continue.
    pub fn handle_disconnect(calls: &mut CallSessionManager, presence: &mut PresenceTracker) {
        calls.handle_transport_lost();
        presence.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::events::{ClientEvent, PresencePayload, TypingPayload};
    use crate::media::{MediaBackend, MediaStream, NoopRingtone, PeerConnection,
        PeerConnectionFactory};
    use crate::models::{CallStatus, CallerInfo, MessageType};
    use crate::transport::EventSink;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct NullSink(Mutex<Vec<ClientEvent>>);

    impl EventSink for NullSink {
        fn emit(&self, event: ClientEvent) -> Result<()> {
            self.0.lock().push(event);
            Ok(())
        }
    }

    struct SilentStream;

    impl MediaStream for SilentStream {
        fn set_audio_enabled(&mut self, _enabled: bool) {}
        fn audio_enabled(&self) -> bool {
            true
        }
        fn set_video_enabled(&mut self, _enabled: bool) {}
        fn video_enabled(&self) -> bool {
            false
        }
        fn has_video(&self) -> bool {
            false
        }
        fn stop(&mut self) {}
    }

    struct SilentMedia;

    impl MediaBackend for SilentMedia {
        fn acquire(&mut self, _video: bool) -> Result<Box<dyn MediaStream>> {
            Ok(Box::new(SilentStream))
        }
    }

    struct SilentPeer;

    impl PeerConnection for SilentPeer {
        fn apply_signal(&mut self, _signal: crate::events::SignalPayload) -> Result<()> {
            Ok(())
        }
        fn poll(&mut self) -> Vec<crate::media::PeerEvent> {
            Vec::new()
        }
        fn destroy(&mut self) {}
    }

    struct SilentFactory;

    impl PeerConnectionFactory for SilentFactory {
        fn create(
            &mut self,
            _initiator: bool,
            _stream: &dyn MediaStream,
        ) -> Result<Box<dyn PeerConnection>> {
            Ok(Box::new(SilentPeer))
        }
    }

    fn components() -> (CallSessionManager, ChatStore, PresenceTracker) {
        let sink = Arc::new(NullSink::default());
        let calls = CallSessionManager::new(
            sink.clone(),
            Box::new(SilentMedia),
            Box::new(SilentFactory),
            Box::new(NoopRingtone),
            CallerInfo {
                id: "u1".to_string(),
                username: "ada".to_string(),
                avatar: None,
            },
            Duration::from_secs(30),
        );
        let store = ChatStore::new(sink, Some("ada".to_string()), Duration::from_millis(2000));
        (calls, store, PresenceTracker::new())
    }

    #[test]
    fn test_presence_events_reach_the_tracker() {
        let (mut calls, mut store, mut presence) = components();

        EventRouter::dispatch(
            ServerEvent::UserOnline(PresencePayload {
                user_id: "u7".to_string(),
            }),
            &mut calls,
            &mut store,
            &mut presence,
        );
        assert!(presence.is_online("u7"));

        EventRouter::dispatch(
            ServerEvent::UserOffline(PresencePayload {
                user_id: "u7".to_string(),
            }),
            &mut calls,
            &mut store,
            &mut presence,
        );
        assert!(!presence.is_online("u7"));
    }

    #[test]
    fn test_call_events_reach_the_session_manager() {
        let (mut calls, mut store, mut presence) = components();

        EventRouter::dispatch(
            ServerEvent::CallIncoming(crate::events::CallIncomingPayload {
                from: "u2".to_string(),
                conversation_id: "c1".to_string(),
                call_type: crate::models::CallType::Voice,
                caller_info: CallerInfo {
                    id: "u2".to_string(),
                    username: "bob".to_string(),
                    avatar: None,
                },
            }),
            &mut calls,
            &mut store,
            &mut presence,
        );
        assert_eq!(calls.status(), CallStatus::Ringing);
    }

    #[test]
    fn test_typing_events_reach_the_store() {
        let (mut calls, mut store, mut presence) = components();

        EventRouter::dispatch(
            ServerEvent::TypingStart(TypingPayload {
                conversation_id: "c1".to_string(),
                username: Some("bob".to_string()),
                user_id: None,
            }),
            &mut calls,
            &mut store,
            &mut presence,
        );
        assert_eq!(store.typing_users("c1"), vec!["bob"]);
    }

    #[test]
    fn test_disconnect_ends_call_and_clears_presence() {
        let (mut calls, mut store, mut presence) = components();
        presence.set_online("u2".to_string());
        calls.initiate(
            "c1",
            CallerInfo {
                id: "u2".to_string(),
                username: "bob".to_string(),
                avatar: None,
            },
            crate::models::CallType::Voice,
        );
        assert_eq!(calls.status(), CallStatus::Connecting);

        EventRouter::handle_disconnect(&mut calls, &mut presence);

        assert_eq!(calls.status(), CallStatus::Idle);
        assert_eq!(presence.online_count(), 0);
        let _ = store.messages();
    }
}
