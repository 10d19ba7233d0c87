//! VoxChat Client Core
//!
//! Client-side core of a real-time messaging application: realtime event
//! transport, presence tracking, conversation/message state, and the
//! voice/video call session lifecycle. UI frameworks bind to [`ChatClient`]
//! by reference; nothing here is a global.

pub mod call;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod models;
pub mod presence;
pub mod rest;
pub mod router;
pub mod store;
pub mod transport;

use std::sync::Arc;
use std::time::Instant;

pub use call::{CallNotice, CallSessionManager, CallSnapshot};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use events::{ClientEvent, ServerEvent, SignalPayload};
pub use media::{
    MediaBackend, MediaStream, NoopRingtone, PeerConnection, PeerConnectionFactory, PeerEvent,
    RingtonePlayer,
};
pub use models::*;
pub use presence::PresenceTracker;
pub use rest::RestClient;
pub use router::EventRouter;
pub use store::ChatStore;
pub use transport::{ConnectionState, EventSink, WebSocketTransport};

/// One client session. Construct it, `connect`, then drive it by calling
/// [`pump`](ChatClient::pump) from the application's event loop (once per
/// frame or on a short interval). All state transitions happen inside a pump
/// turn, one event at a time.
pub struct ChatClient {
    transport: Arc<WebSocketTransport>,
    rest: Arc<RestClient>,
    store: ChatStore,
    presence: PresenceTracker,
    calls: CallSessionManager,
    was_connected: bool,
}

impl ChatClient {
    pub fn new(
        config: ClientConfig,
        identity: CallerInfo,
        media: Box<dyn MediaBackend>,
        peers: Box<dyn PeerConnectionFactory>,
        ringtone: Box<dyn RingtonePlayer>,
    ) -> Result<Self> {
        let transport = Arc::new(WebSocketTransport::new());
        let rest = Arc::new(RestClient::new(&config)?);
        let sink: Arc<dyn EventSink> = transport.clone();

        let store = ChatStore::new(
            sink.clone(),
            Some(identity.username.clone()),
            config.typing_debounce(),
        );
        let calls = CallSessionManager::new(
            sink,
            media,
            peers,
            ringtone,
            identity,
            config.ring_timeout(),
        );

        Ok(Self {
            transport,
            rest,
            store,
            presence: PresenceTracker::new(),
            calls,
            was_connected: false,
        })
    }

    /// Establish the realtime channel and authorize REST calls.
    pub async fn connect(&mut self, config: &ClientConfig, token: &str) -> Result<()> {
        self.rest.set_token(token);
        self.transport.connect(config, token).await?;
        self.was_connected = true;
        Ok(())
    }

    /// One event-processing turn: drain inbound events through the router,
    /// react to a transport drop, then fire due timers.
    pub fn pump(&mut self) {
        for event in self.transport.poll_events() {
            EventRouter::dispatch(event, &mut self.calls, &mut self.store, &mut self.presence);
        }

        let connected = self.transport.state() == ConnectionState::Connected;
        if self.was_connected && !connected {
            tracing::warn!("realtime channel dropped");
            EventRouter::handle_disconnect(&mut self.calls, &mut self.presence);
        }
        self.was_connected = connected;

        let now = Instant::now();
        self.calls.poll(now);
        self.store.poll_timers(now);
    }

    /// Refetch the sidebar list. Incremental patches keep it current between
    /// calls; this is only needed at startup and after a reconnect.
    pub async fn refresh_conversations(&mut self) -> Result<()> {
        let conversations = self.rest.fetch_conversations().await?;
        self.store.set_conversations(conversations);
        Ok(())
    }

    /// Select a conversation: join its room, load history, mark it read.
    pub async fn open_conversation(&mut self, conversation_id: &str) -> Result<()> {
        self.store.select_conversation(Some(conversation_id));
        let messages = self.rest.fetch_messages(conversation_id).await?;
        self.store.set_messages(messages);

        if let Err(e) = self.rest.mark_read(conversation_id).await {
            tracing::warn!("read receipt update failed: {}", e);
        }
        Ok(())
    }

    /// End any live call, leave the active room, and tear the channel down.
    /// Safe to call more than once.
    pub fn dispose(&mut self) {
        self.calls.end();
        self.store.select_conversation(None);
        self.presence.reset();
        self.transport.close();
        self.was_connected = false;
    }

    // ============= Component access for UI bindings =============

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ChatStore {
        &mut self.store
    }

    pub fn calls(&self) -> &CallSessionManager {
        &self.calls
    }

    pub fn calls_mut(&mut self) -> &mut CallSessionManager {
        &mut self.calls
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn watch_connection(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.transport.watch_state()
    }
}
