//! Signals a session produces for its collaborators.

use ppsession_core::{MessageError, SessionState, Stanza};

/// Something a session wants the outside world to know or do.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    /// A transport asked for signaling; answer with `on_signaling_ready`.
    RequestSignaling,
    /// A stanza sent on behalf of a transport failed.
    ErrorMessage {
        stanza_id: String,
        error_type: String,
        error: MessageError,
    },
    /// A transport channel went away.
    ChannelGone {
        content_name: String,
        channel_name: String,
    },
    /// The peer sent an info message.
    InfoMessage(serde_json::Value),
    /// A stanza to deliver to the peer.
    Outgoing(Stanza),
    /// Reason the peer gave when terminating.
    ReceivedTerminateReason(String),
    /// The session entered a new state.
    StateChanged(SessionState),
    /// The session is finished and may be destroyed.
    Released,
}

/// A signal tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session_id: String,
    pub signal: SessionSignal,
}
