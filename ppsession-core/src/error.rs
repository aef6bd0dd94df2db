//! Error types for ppsession.
//!
//! Two families live here: [`SessionError`] is returned to the caller of a
//! local operation and never put on the wire, while [`MessageError`] is what a
//! message handler hands back to the dispatch layer to become a protocol error
//! response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{SessionOp, SessionState};

/// Stanza-level error conditions carried by error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StanzaErrorKind {
    /// Malformed or unparseable request.
    BadRequest,
    /// Request is not allowed in the current session state.
    NotAllowed,
    /// Request is understood but cannot be satisfied.
    NotAcceptable,
    /// Request addresses a session that does not exist.
    ItemNotFound,
}

impl std::fmt::Display for StanzaErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest => write!(f, "bad-request"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::NotAcceptable => write!(f, "not-acceptable"),
            Self::ItemNotFound => write!(f, "item-not-found"),
        }
    }
}

/// Machine-readable marker identifying the entity that caused an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "marker", rename_all = "kebab-case")]
pub enum ErrorExtra {
    /// A transport info named a content without a transport proxy.
    UnknownContentName { content_name: String },
    /// A candidate named a channel the content's transport does not have.
    UnknownChannelName {
        content_name: String,
        candidate_name: String,
    },
}

/// Structured error produced by a message handler.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {text}")]
pub struct MessageError {
    pub kind: StanzaErrorKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<ErrorExtra>,
}

impl MessageError {
    /// Create an error without an extra marker.
    pub fn new(kind: StanzaErrorKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            extra: None,
        }
    }

    /// A malformed-message error.
    pub fn bad_parse(text: impl Into<String>) -> Self {
        Self::new(StanzaErrorKind::BadRequest, text)
    }

    /// The message is not allowed in the current state.
    pub fn not_allowed() -> Self {
        Self::new(
            StanzaErrorKind::NotAllowed,
            "message not allowed in current state",
        )
    }

    /// Attach a machine-readable marker.
    pub fn with_extra(mut self, extra: ErrorExtra) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Classification of fatal session errors recorded with `set_error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// No error.
    #[default]
    None,
    /// A timer expired, e.g. the transport never became writable.
    Time,
    /// The peer answered one of our stanzas with an error.
    Response,
    /// The network failed.
    Network,
    /// The negotiated content could not be handled.
    Content,
}

impl std::fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Time => write!(f, "time"),
            Self::Response => write!(f, "response"),
            Self::Network => write!(f, "network"),
            Self::Content => write!(f, "content"),
        }
    }
}

/// Errors returned from local session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation is not legal in the current state.
    #[error("cannot {op} in state {state}")]
    InvalidState { op: SessionOp, state: SessionState },

    /// A transport info used a transport type this session does not speak.
    #[error("No supported transport in offer.")]
    UnsupportedTransport {
        content_name: String,
        transport_type: String,
    },

    /// Referenced content has no transport proxy.
    #[error("unknown content name: {0}")]
    UnknownContent(String),

    /// The session has already terminated.
    #[error("session {0} is terminated")]
    Terminated(String),

    /// Referenced session does not exist.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// An outgoing stanza could not be sent.
    #[error("send error: {0}")]
    Send(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stanza_error_kind_display() {
        assert_eq!(StanzaErrorKind::BadRequest.to_string(), "bad-request");
        assert_eq!(StanzaErrorKind::NotAllowed.to_string(), "not-allowed");
        assert_eq!(StanzaErrorKind::NotAcceptable.to_string(), "not-acceptable");
        assert_eq!(StanzaErrorKind::ItemNotFound.to_string(), "item-not-found");
    }

    #[test]
    fn message_error_serde() {
        let error = MessageError::bad_parse("channel named in candidate does not exist")
            .with_extra(ErrorExtra::UnknownChannelName {
                content_name: "audio".to_string(),
                candidate_name: "rtcp".to_string(),
            });
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["kind"], "bad-request");
        assert_eq!(json["extra"]["marker"], "unknown-channel-name");
        assert_eq!(json["extra"]["candidate_name"], "rtcp");

        let parsed: MessageError = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, error);
    }

    #[test]
    fn session_error_display() {
        let err = SessionError::InvalidState {
            op: SessionOp::Accept,
            state: SessionState::Init,
        };
        assert_eq!(err.to_string(), "cannot accept in state INIT");
        assert_eq!(SessionErrorKind::default(), SessionErrorKind::None);
    }
}
