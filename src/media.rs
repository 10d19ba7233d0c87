//! Media and peer-connection seams.
//!
//! The call session manager owns its local stream and peer connection
//! exclusively; everything platform-specific (device capture, the actual
//! peer transport, ringtone playback) sits behind these traits so the
//! session lifecycle can run on any backend.

use crate::error::Result;
use crate::events::SignalPayload;

/// Handle to the local capture stream. Exclusively owned by the active call
/// session; released exactly once when the session reaches a terminal state.
pub trait MediaStream: Send {
    fn set_audio_enabled(&mut self, enabled: bool);
    fn audio_enabled(&self) -> bool;
    fn set_video_enabled(&mut self, enabled: bool);
    fn video_enabled(&self) -> bool;
    fn has_video(&self) -> bool;
    /// Stop all tracks. Must be safe to call more than once.
    fn stop(&mut self);
}

/// Device access. Audio is always captured; video only when requested.
pub trait MediaBackend: Send {
    fn acquire(&mut self, video: bool) -> Result<Box<dyn MediaStream>>;
}

/// Events surfaced by a peer connection since the last poll.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Consolidated local description, ready to relay to the remote side.
    Signal(SignalPayload),
    /// Remote media arrived; the call is live.
    RemoteStream,
    /// Negotiation or transport failure. Terminal for the call.
    Failed(String),
}

/// A peer transport negotiated through exchanged signal payloads.
///
/// An initiator produces its signal unprompted; a non-initiator answers after
/// the remote description is applied. Trickle is disabled, so there is one
/// payload per side.
pub trait PeerConnection: Send {
    fn apply_signal(&mut self, signal: SignalPayload) -> Result<()>;
    /// Drain signal/stream/failure events produced since the last poll.
    fn poll(&mut self) -> Vec<PeerEvent>;
    /// Tear down the connection. Must be safe to call more than once.
    fn destroy(&mut self);
}

pub trait PeerConnectionFactory: Send {
    fn create(&mut self, initiator: bool, stream: &dyn MediaStream)
        -> Result<Box<dyn PeerConnection>>;
}

/// Looped ringtone for incoming calls.
pub trait RingtonePlayer: Send {
    fn start_loop(&mut self);
    fn stop(&mut self);
}

/// Silent player for headless embeddings and tests.
pub struct NoopRingtone;

impl RingtonePlayer for NoopRingtone {
    fn start_loop(&mut self) {}
    fn stop(&mut self) {}
}
