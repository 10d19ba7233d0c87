//! Call session lifecycle.
//!
//! At most one non-terminal session exists per client. The manager owns the
//! local media stream and the peer connection exclusively; both are released
//! exactly once when the session reaches a terminal state, after which the
//! manager is back at idle. Failures never escape this module - they become a
//! terminal transition plus a [`CallNotice`] for the UI.

use crate::error::Result;
use crate::events::{
    CallAnswerPayload, CallEndPayload, CallIncomingPayload, CallInitiatePayload, ClientEvent,
    SignalRelayPayload,
};
use crate::media::{MediaBackend, MediaStream, PeerConnection, PeerConnectionFactory, PeerEvent,
    RingtonePlayer};
use crate::models::{CallDirection, CallStatus, CallType, CallerInfo};
use crate::transport::EventSink;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Side-channel notice for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum CallNotice {
    /// Device permission denied or no device present. The attempted call is
    /// over; the user is told to check permissions.
    MediaUnavailable(String),
    /// Peer negotiation or mid-call transport failure.
    CallFailed(String),
    /// Outgoing call rang past the timeout without an answer.
    NoAnswer,
    RemoteRejected,
    RemoteEnded,
}

/// Read-only view of the active session for UI bindings.
#[derive(Debug, Clone)]
pub struct CallSnapshot {
    pub session_id: String,
    pub conversation_id: String,
    pub direction: CallDirection,
    pub call_type: CallType,
    pub status: CallStatus,
    pub remote: CallerInfo,
    pub started_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub duration_secs: u64,
    pub muted: bool,
    pub video_enabled: bool,
}

struct CallSession {
    id: String,
    conversation_id: String,
    direction: CallDirection,
    call_type: CallType,
    status: CallStatus,
    remote: CallerInfo,
    stream: Option<Box<dyn MediaStream>>,
    peer: Option<Box<dyn PeerConnection>>,
    started_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    connected_instant: Option<Instant>,
    ring_deadline: Option<Instant>,
    duration_secs: u64,
}

impl CallSession {
    /// Release the media and peer handles. Taking the options keeps the
    /// release calls to exactly one each.
    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        if let Some(mut peer) = self.peer.take() {
            peer.destroy();
        }
    }
}

pub struct CallSessionManager {
    sink: Arc<dyn EventSink>,
    media: Box<dyn MediaBackend>,
    peers: Box<dyn PeerConnectionFactory>,
    ringtone: Box<dyn RingtonePlayer>,
    identity: CallerInfo,
    ring_timeout: Duration,
    session: Option<CallSession>,
    last_outcome: Option<CallStatus>,
    notices: VecDeque<CallNotice>,
}

impl CallSessionManager {
    pub fn new(
        sink: Arc<dyn EventSink>,
        media: Box<dyn MediaBackend>,
        peers: Box<dyn PeerConnectionFactory>,
        ringtone: Box<dyn RingtonePlayer>,
        identity: CallerInfo,
        ring_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            media,
            peers,
            ringtone,
            identity,
            ring_timeout,
            session: None,
            last_outcome: None,
            notices: VecDeque::new(),
        }
    }

    pub fn status(&self) -> CallStatus {
        self.session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(CallStatus::Idle)
    }

    pub fn snapshot(&self) -> Option<CallSnapshot> {
        self.session.as_ref().map(|s| CallSnapshot {
            session_id: s.id.clone(),
            conversation_id: s.conversation_id.clone(),
            direction: s.direction,
            call_type: s.call_type,
            status: s.status,
            remote: s.remote.clone(),
            started_at: s.started_at,
            connected_at: s.connected_at,
            duration_secs: s.duration_secs,
            muted: s.stream.as_ref().map(|m| !m.audio_enabled()).unwrap_or(false),
            video_enabled: s.stream.as_ref().map(|m| m.video_enabled()).unwrap_or(false),
        })
    }

    /// Terminal status of the most recently ended session - `Ended`,
    /// `Rejected`, or `Failed`. Cleared when a new session starts.
    pub fn last_outcome(&self) -> Option<CallStatus> {
        self.last_outcome
    }

    /// Drain notices queued since the last turn.
    pub fn take_notices(&mut self) -> Vec<CallNotice> {
        self.notices.drain(..).collect()
    }

    // ============= User actions =============

    /// Start an outgoing call. Only valid at idle; ignored otherwise.
    pub fn initiate(&mut self, conversation_id: &str, receiver: CallerInfo, call_type: CallType) {
        if self.session.is_some() {
            tracing::warn!("call already in progress, ignoring initiate");
            return;
        }

        let stream = match self.media.acquire(call_type.has_video()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("media acquisition failed: {}", e);
                self.notices.push_back(CallNotice::MediaUnavailable(e.to_string()));
                return;
            }
        };

        self.last_outcome = None;
        self.session = Some(CallSession {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            direction: CallDirection::Outgoing,
            call_type,
            status: CallStatus::Connecting,
            remote: receiver.clone(),
            stream: Some(stream),
            peer: None,
            started_at: Utc::now(),
            connected_at: None,
            connected_instant: None,
            ring_deadline: Some(Instant::now() + self.ring_timeout),
            duration_secs: 0,
        });

        self.emit(ClientEvent::CallInitiate(CallInitiatePayload {
            conversation_id: conversation_id.to_string(),
            call_type,
            receiver_id: receiver.id,
            caller_info: self.identity.clone(),
        }));
    }

    /// Answer a ringing incoming call.
    pub fn accept(&mut self) {
        let ready = matches!(
            self.session.as_ref().map(|s| (s.direction, s.status)),
            Some((CallDirection::Incoming, CallStatus::Ringing))
        );
        if !ready {
            tracing::warn!("accept outside of a ringing incoming call, ignoring");
            return;
        }

        self.ringtone.stop();

        let video = self
            .session
            .as_ref()
            .map(|s| s.call_type.has_video())
            .unwrap_or(false);
        let stream = match self.media.acquire(video) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("media acquisition failed on accept: {}", e);
                self.notices.push_back(CallNotice::MediaUnavailable(e.to_string()));
                // Still ringing from the caller's perspective, so this
                // publishes call:reject.
                self.end();
                return;
            }
        };

        let answer = if let Some(session) = self.session.as_mut() {
            session.stream = Some(stream);
            session.status = CallStatus::Accepted;
            Some(CallAnswerPayload {
                conversation_id: session.conversation_id.clone(),
                caller_id: session.remote.id.clone(),
            })
        } else {
            None
        };

        if let Some(payload) = answer {
            self.emit(ClientEvent::CallAccept(payload));
        }
        // The peer connection is created on the caller's first inbound
        // signal, as non-initiator.
    }

    /// Decline a ringing incoming call. Same terminal path as [`end`].
    pub fn reject(&mut self) {
        self.end();
    }

    /// Terminate the session from any state. Idempotent: the session is taken
    /// on the first call, so repeat calls are no-ops and the reject/end event
    /// is published exactly once.
    pub fn end(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        self.ringtone.stop();

        let still_ringing = session.direction == CallDirection::Incoming
            && session.status == CallStatus::Ringing;
        let event = if still_ringing {
            ClientEvent::CallReject(CallAnswerPayload {
                conversation_id: session.conversation_id.clone(),
                caller_id: session.remote.id.clone(),
            })
        } else {
            ClientEvent::CallEnd(CallEndPayload {
                conversation_id: session.conversation_id.clone(),
            })
        };

        self.last_outcome = Some(if still_ringing {
            CallStatus::Rejected
        } else {
            CallStatus::Ended
        });
        session.release();
        self.emit(event);
    }

    /// Flip the local audio track. Purely local; no signaling event.
    pub fn toggle_mute(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if matches!(session.status, CallStatus::Accepted | CallStatus::Connected) {
                if let Some(stream) = session.stream.as_mut() {
                    let enabled = stream.audio_enabled();
                    stream.set_audio_enabled(!enabled);
                }
            }
        }
    }

    /// Flip the local video track. Only meaningful on video calls.
    pub fn toggle_video(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.call_type.has_video()
                && matches!(session.status, CallStatus::Accepted | CallStatus::Connected)
            {
                if let Some(stream) = session.stream.as_mut() {
                    if stream.has_video() {
                        let enabled = stream.video_enabled();
                        stream.set_video_enabled(!enabled);
                    }
                }
            }
        }
    }

    // ============= Inbound events =============

    /// `call:incoming`. Dropped silently while any session exists - the
    /// client supports exactly one concurrent call.
    pub fn handle_incoming(&mut self, payload: CallIncomingPayload) {
        if self.session.is_some() {
            tracing::debug!(
                conversation = %payload.conversation_id,
                "busy, dropping incoming call"
            );
            return;
        }

        self.last_outcome = None;
        self.session = Some(CallSession {
            id: Uuid::new_v4().to_string(),
            conversation_id: payload.conversation_id,
            direction: CallDirection::Incoming,
            call_type: payload.call_type,
            status: CallStatus::Ringing,
            remote: payload.caller_info,
            stream: None,
            peer: None,
            started_at: Utc::now(),
            connected_at: None,
            connected_instant: None,
            ring_deadline: None,
            duration_secs: 0,
        });

        self.ringtone.start_loop();
    }

    /// `call:accepted` - the callee answered our outgoing call. We become the
    /// signaling initiator.
    pub fn handle_remote_accepted(&mut self) {
        let ready = matches!(
            self.session.as_ref().map(|s| (s.direction, s.status)),
            Some((CallDirection::Outgoing, CallStatus::Connecting))
        );
        if !ready {
            tracing::debug!("call:accepted outside of an outgoing connecting call, ignoring");
            return;
        }

        if let Some(session) = self.session.as_mut() {
            session.status = CallStatus::Accepted;
            session.ring_deadline = None;
        }
        self.create_peer(true, None);
    }

    /// `call:reject` - the callee declined.
    pub fn handle_remote_rejected(&mut self, conversation_id: &str) {
        if self.terminate_remote(conversation_id, CallStatus::Rejected) {
            self.notices.push_back(CallNotice::RemoteRejected);
        }
    }

    /// `call:end` - the other side hung up.
    pub fn handle_remote_end(&mut self, conversation_id: &str) {
        if self.terminate_remote(conversation_id, CallStatus::Ended) {
            self.notices.push_back(CallNotice::RemoteEnded);
        }
    }

    /// `webrtc:signal`. If no peer connection exists yet, the arriving remote
    /// description creates one as non-initiator - this is how the callee's
    /// connection comes to be.
    pub fn handle_signal(&mut self, payload: SignalRelayPayload) {
        let has_peer = match self.session.as_ref() {
            Some(s)
                if s.remote.id == payload.from
                    && matches!(s.status, CallStatus::Accepted | CallStatus::Connected) =>
            {
                s.peer.is_some()
            }
            _ => {
                tracing::debug!(from = %payload.from, "dropping signal for no matching session");
                return;
            }
        };

        if has_peer {
            let applied = self
                .session
                .as_mut()
                .and_then(|s| s.peer.as_mut())
                .map(|peer| peer.apply_signal(payload.signal));
            if let Some(Err(e)) = applied {
                self.fail(format!("failed to apply remote signal: {}", e));
                return;
            }
            self.pump_peer();
        } else {
            self.create_peer(false, Some(payload.signal));
        }
    }

    /// The realtime channel dropped. A live call cannot survive it; treat it
    /// as a signaling failure and end locally.
    pub fn handle_transport_lost(&mut self) {
        if self.session.is_some() {
            self.fail("realtime connection lost".to_string());
        }
    }

    // ============= Timers and peer pump =============

    /// One cooperative turn: drain peer events, fire the ring timeout, and
    /// advance the connected-call duration.
    pub fn poll(&mut self, now: Instant) {
        self.pump_peer();

        let timed_out = matches!(
            self.session.as_ref(),
            Some(s) if s.status == CallStatus::Connecting
                && s.ring_deadline.map_or(false, |deadline| deadline <= now)
        );
        if timed_out {
            self.notices.push_back(CallNotice::NoAnswer);
            self.end();
            return;
        }

        if let Some(session) = self.session.as_mut() {
            if session.status == CallStatus::Connected {
                if let Some(connected) = session.connected_instant {
                    session.duration_secs = now.saturating_duration_since(connected).as_secs();
                }
            }
        }
    }

    // ============= Internals =============

    fn create_peer(&mut self, initiator: bool, seed: Option<crate::events::SignalPayload>) {
        let created = {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            if session.peer.is_some() {
                return;
            }
            let Some(stream) = session.stream.as_deref() else {
                return;
            };
            self.peers.create(initiator, stream)
        };

        match created {
            Ok(mut peer) => {
                let seeded: Result<()> = match seed {
                    Some(signal) => peer.apply_signal(signal),
                    None => Ok(()),
                };
                if let Some(session) = self.session.as_mut() {
                    session.peer = Some(peer);
                }
                match seeded {
                    Ok(()) => self.pump_peer(),
                    Err(e) => self.fail(format!("failed to apply remote signal: {}", e)),
                }
            }
            Err(e) => self.fail(format!("failed to create peer connection: {}", e)),
        }
    }

    fn pump_peer(&mut self) {
        let events = match self.session.as_mut().and_then(|s| s.peer.as_mut()) {
            Some(peer) => peer.poll(),
            None => return,
        };

        for event in events {
            match event {
                PeerEvent::Signal(signal) => {
                    let addressed = self.session.as_ref().map(|s| SignalRelayPayload {
                        signal,
                        to: s.remote.id.clone(),
                        from: self.identity.id.clone(),
                        conversation_id: s.conversation_id.clone(),
                    });
                    if let Some(payload) = addressed {
                        self.emit(ClientEvent::WebrtcSignal(payload));
                    }
                }
                PeerEvent::RemoteStream => {
                    if let Some(session) = self.session.as_mut() {
                        if session.status == CallStatus::Accepted {
                            session.status = CallStatus::Connected;
                            session.connected_at = Some(Utc::now());
                            session.connected_instant = Some(Instant::now());
                        }
                    }
                }
                PeerEvent::Failed(reason) => {
                    self.fail(reason);
                    return;
                }
            }
        }
    }

    /// Terminal failure path: release everything, tell the remote side the
    /// call is over, surface a notice, return to idle.
    fn fail(&mut self, reason: String) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        tracing::warn!(conversation = %session.conversation_id, "call failed: {}", reason);
        self.ringtone.stop();
        self.last_outcome = Some(CallStatus::Failed);
        session.release();
        self.emit(ClientEvent::CallEnd(CallEndPayload {
            conversation_id: session.conversation_id.clone(),
        }));
        self.notices.push_back(CallNotice::CallFailed(reason));
    }

    /// Remote-initiated teardown: release without publishing anything back.
    fn terminate_remote(&mut self, conversation_id: &str, outcome: CallStatus) -> bool {
        let matches_session = self
            .session
            .as_ref()
            .map(|s| s.conversation_id == conversation_id)
            .unwrap_or(false);
        if !matches_session {
            return false;
        }
        if let Some(mut session) = self.session.take() {
            self.ringtone.stop();
            self.last_outcome = Some(outcome);
            session.release();
        }
        true
    }

    fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.sink.emit(event) {
            tracing::debug!("emit failed: {}", e);
        }
    }
}
