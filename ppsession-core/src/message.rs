//! Decoded protocol messages and the stanzas that carry them.
//!
//! A [`Stanza`] is the unit exchanged with the signaling collaborator: either
//! a request carrying a [`SessionMessage`], or a result/error response
//! correlated to a request by its id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::description::{ContentGroup, ContentInfo, SessionDescription, TransportInfo};
use crate::error::MessageError;

/// Error type attached to error responses produced by the dispatch layer.
pub const ERROR_TYPE_MODIFY: &str = "modify";

/// Terminate reason for a clean shutdown.
pub const TERMINATE_SUCCESS: &str = "success";
/// Terminate reason after a fatal session error.
pub const TERMINATE_ERROR: &str = "general-error";

/// Contents, transports and groups carried by an initiate or accept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContents {
    pub contents: Vec<ContentInfo>,
    #[serde(default)]
    pub transports: Vec<TransportInfo>,
    #[serde(default)]
    pub groups: Vec<ContentGroup>,
}

impl SessionContents {
    /// The offered or accepted description, without transports.
    pub fn description(&self) -> SessionDescription {
        SessionDescription::new(self.contents.clone(), self.groups.clone())
    }
}

/// Reason carried by reject and terminate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTerminate {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_reason: Option<String>,
}

impl SessionTerminate {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            debug_reason: None,
        }
    }
}

/// Action-specific payload of a session message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessageBody {
    Initiate(SessionContents),
    Accept(SessionContents),
    Reject(SessionTerminate),
    Terminate(SessionTerminate),
    Info { payload: serde_json::Value },
    TransportInfo { transports: Vec<TransportInfo> },
    /// Any action type this engine does not know.
    #[serde(other)]
    Unknown,
}

impl MessageBody {
    /// Wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Initiate(_) => "initiate",
            Self::Accept(_) => "accept",
            Self::Reject(_) => "reject",
            Self::Terminate(_) => "terminate",
            Self::Info { .. } => "info",
            Self::TransportInfo { .. } => "transport-info",
            Self::Unknown => "unknown",
        }
    }
}

/// A decoded session message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Correlation id; responses echo it.
    pub id: String,
    /// Session id.
    pub sid: String,
    pub from: String,
    pub to: String,
    pub body: MessageBody,
}

impl SessionMessage {
    /// Create a message with a fresh correlation id.
    pub fn new(
        sid: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        body: MessageBody,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sid: sid.into(),
            from: from.into(),
            to: to.into(),
            body,
        }
    }

    /// Build the acknowledgement for this message.
    pub fn ack(&self) -> Stanza {
        Stanza::Result {
            id: self.id.clone(),
            sid: self.sid.clone(),
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }

    /// Build an error response for this message.
    pub fn error_response(&self, error: MessageError) -> Stanza {
        Stanza::Error {
            id: self.id.clone(),
            sid: self.sid.clone(),
            from: self.to.clone(),
            to: self.from.clone(),
            error_type: ERROR_TYPE_MODIFY.to_string(),
            error,
        }
    }
}

/// Unit exchanged with the signaling collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Stanza {
    Request(SessionMessage),
    Result {
        id: String,
        sid: String,
        from: String,
        to: String,
    },
    Error {
        id: String,
        sid: String,
        from: String,
        to: String,
        error_type: String,
        error: MessageError,
    },
}

impl Stanza {
    pub fn id(&self) -> &str {
        match self {
            Self::Request(msg) => &msg.id,
            Self::Result { id, .. } | Self::Error { id, .. } => id,
        }
    }

    pub fn sid(&self) -> &str {
        match self {
            Self::Request(msg) => &msg.sid,
            Self::Result { sid, .. } | Self::Error { sid, .. } => sid,
        }
    }

    pub fn to(&self) -> &str {
        match self {
            Self::Request(msg) => &msg.to,
            Self::Result { to, .. } | Self::Error { to, .. } => to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StanzaErrorKind;

    #[test]
    fn body_type_tags() {
        let body = MessageBody::TransportInfo { transports: vec![] };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "transport-info");
        assert_eq!(body.action(), "transport-info");

        let reject = MessageBody::Reject(SessionTerminate::new("busy"));
        let json = serde_json::to_value(&reject).unwrap();
        assert_eq!(json["type"], "reject");
        assert_eq!(json["reason"], "busy");
    }

    #[test]
    fn unknown_type_decodes_to_fallback() {
        let json = r#"{"id":"1","sid":"s","from":"a","to":"b","body":{"type":"session-modify"}}"#;
        let msg: SessionMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.body, MessageBody::Unknown);
    }

    #[test]
    fn ack_and_error_swap_addresses() {
        let msg = SessionMessage::new("sid1", "alice", "bob", MessageBody::Unknown);

        let ack = msg.ack();
        assert_eq!(ack.id(), msg.id);
        assert_eq!(ack.to(), "alice");
        assert_eq!(ack.sid(), "sid1");

        let err = msg.error_response(MessageError::not_allowed());
        match err {
            Stanza::Error {
                error, error_type, ..
            } => {
                assert_eq!(error.kind, StanzaErrorKind::NotAllowed);
                assert_eq!(error_type, ERROR_TYPE_MODIFY);
            }
            other => panic!("expected error stanza, got {:?}", other),
        }
    }

    #[test]
    fn stanza_roundtrip_keeps_kind() {
        let msg = SessionMessage::new(
            "sid1",
            "alice",
            "bob",
            MessageBody::Terminate(SessionTerminate::new(TERMINATE_SUCCESS)),
        );
        let stanza = Stanza::Request(msg);
        let json = serde_json::to_string(&stanza).unwrap();
        assert!(json.contains("\"kind\":\"request\""));
        let parsed: Stanza = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stanza);
    }
}
