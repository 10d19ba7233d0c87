//! Realtime transport - one persistent authenticated WebSocket channel.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::events::{ClientEvent, ServerEvent};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

/// Fire-and-forget publish seam. The store and the call manager emit through
/// this; tests substitute a recording sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ClientEvent) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Duplex event channel over WebSocket.
///
/// Inbound frames are parsed on the read task and buffered; the owning client
/// drains them with `poll_events` on its single event-processing turn, so no
/// two handlers ever run concurrently. Reconnection is left to the embedding
/// application - the state watch tells it when the channel dropped.
pub struct WebSocketTransport {
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
    incoming: Arc<Mutex<VecDeque<ServerEvent>>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            sender: Mutex::new(None),
            incoming: Arc::new(Mutex::new(VecDeque::new())),
            state_tx: Arc::new(state_tx),
            state_rx,
        }
    }

    pub async fn connect(&self, config: &ClientConfig, token: &str) -> Result<()> {
        self.state_tx.send_replace(ConnectionState::Connecting);

        let (ws_stream, _) = match connect_async(config.ws_url()).await {
            Ok(ok) => ok,
            Err(e) => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.sender.lock() = Some(tx);

        // Authenticate before anything else goes over the wire
        let auth_msg = json!({
            "event": "authenticate",
            "payload": { "token": token }
        });
        write.send(WsMessage::Text(auth_msg.to_string())).await?;

        let incoming = self.incoming.clone();
        let state = self.state_tx.clone();

        // Receive task
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        if let Ok(frame) = serde_json::from_str::<Value>(&text) {
                            match ServerEvent::from_frame(&frame) {
                                Some(event) => incoming.lock().push_back(event),
                                None => {
                                    tracing::debug!(?frame, "dropping unrecognized frame")
                                }
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            state.send_replace(ConnectionState::Disconnected);
        });

        // Send task
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if write.send(WsMessage::Text(msg)).await.is_err() {
                    break;
                }
            }
        });

        self.state_tx.send_replace(ConnectionState::Connected);
        Ok(())
    }

    /// Drain events buffered since the last turn, in arrival order.
    pub fn poll_events(&self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        let mut queue = self.incoming.lock();
        while let Some(event) = queue.pop_front() {
            events.push(event);
        }
        events
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Drop the writer and any buffered events so nothing outlives the
    /// channel once the owning session ends.
    pub fn close(&self) {
        self.sender.lock().take();
        self.incoming.lock().clear();
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for WebSocketTransport {
    fn emit(&self, event: ClientEvent) -> Result<()> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(Error::NotConnected)?;
        sender
            .send(event.to_frame().to_string())
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        Ok(())
    }
}
