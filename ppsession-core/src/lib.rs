//! # ppsession-core
//!
//! Core types for ppsession, a peer-to-peer session negotiation protocol.
//!
//! This crate provides the session states and their transition table, the
//! decoded protocol messages and stanzas, content and transport descriptors,
//! and the error taxonomy shared by the engine and its collaborators.

pub mod description;
pub mod error;
pub mod message;
pub mod state;

pub use description::{
    Candidate, ContentGroup, ContentInfo, SessionDescription, TransportInfo, GROUP_TYPE_BUNDLE,
};
pub use error::{
    ErrorExtra, MessageError, SessionError, SessionErrorKind, SessionResult, StanzaErrorKind,
};
pub use message::{
    MessageBody, SessionContents, SessionMessage, SessionTerminate, Stanza, TERMINATE_ERROR,
    TERMINATE_SUCCESS,
};
pub use state::{SessionOp, SessionState};

/// Default transport type spoken by sessions.
pub const DEFAULT_TRANSPORT_TYPE: &str = "http://www.google.com/transport/p2p";
