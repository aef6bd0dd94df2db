//! Session state machine definitions.
//!
//! Defines the negotiation states, the operations that drive them, and the
//! transition table mapping `(state, operation)` to the next state.

use serde::{Deserialize, Serialize};

/// Negotiation states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Freshly created, nothing sent or received.
    Init,
    /// We sent an initiate and await accept or reject.
    SentInitiate,
    /// The peer sent us an initiate.
    ReceivedInitiate,
    /// We accepted the peer's initiate.
    SentAccept,
    /// The peer accepted our initiate.
    ReceivedAccept,
    /// We sent a modify on an accepted session.
    SentModify,
    /// The peer sent a modify on an accepted session.
    ReceivedModify,
    /// We rejected the peer's initiate or modify.
    SentReject,
    /// The peer rejected our initiate.
    ReceivedReject,
    /// Terminal - we terminated the session.
    SentTerminate,
    /// Terminal - the peer terminated the session.
    ReceivedTerminate,
}

impl SessionState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SentTerminate | Self::ReceivedTerminate)
    }

    /// Check if this state was reached through a reject.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::SentReject | Self::ReceivedReject)
    }

    /// Get valid transitions from current state.
    pub fn valid_transitions(&self) -> &'static [SessionState] {
        use SessionState::*;
        match self {
            Init => &[SentInitiate, ReceivedInitiate, SentTerminate, ReceivedTerminate],
            SentInitiate => &[ReceivedAccept, ReceivedReject, SentTerminate, ReceivedTerminate],
            ReceivedInitiate => &[SentAccept, SentReject, SentTerminate, ReceivedTerminate],
            SentAccept | ReceivedAccept => {
                &[SentModify, ReceivedModify, SentTerminate, ReceivedTerminate]
            }
            SentModify => &[SentTerminate, ReceivedTerminate],
            ReceivedModify => &[SentReject, SentTerminate, ReceivedTerminate],
            SentReject | ReceivedReject => &[SentTerminate, ReceivedTerminate],
            SentTerminate | ReceivedTerminate => &[],
        }
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Look up the state an operation leads to, or `None` when the operation
    /// is not legal in this state.
    pub fn apply(&self, op: SessionOp) -> Option<SessionState> {
        use SessionOp as Op;
        use SessionState::*;
        let next = match (self, op) {
            (Init, Op::Initiate) => SentInitiate,
            (Init, Op::ReceiveInitiate) => ReceivedInitiate,
            (ReceivedInitiate, Op::Accept) => SentAccept,
            (SentInitiate, Op::ReceiveAccept) => ReceivedAccept,
            (ReceivedInitiate | ReceivedModify, Op::Reject) => SentReject,
            (SentInitiate, Op::ReceiveReject) => ReceivedReject,
            (state, Op::Terminate) if !state.is_terminal() => SentTerminate,
            (state, Op::ReceiveTerminate) if !state.is_terminal() => ReceivedTerminate,
            _ => return None,
        };
        debug_assert!(self.can_transition_to(next));
        Some(next)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::SentInitiate => "SENT_INITIATE",
            Self::ReceivedInitiate => "RECEIVED_INITIATE",
            Self::SentAccept => "SENT_ACCEPT",
            Self::ReceivedAccept => "RECEIVED_ACCEPT",
            Self::SentModify => "SENT_MODIFY",
            Self::ReceivedModify => "RECEIVED_MODIFY",
            Self::SentReject => "SENT_REJECT",
            Self::ReceivedReject => "RECEIVED_REJECT",
            Self::SentTerminate => "SENT_TERMINATE",
            Self::ReceivedTerminate => "RECEIVED_TERMINATE",
        };
        f.write_str(name)
    }
}

/// Operations that drive session state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOp {
    /// Local initiate.
    Initiate,
    /// Local accept.
    Accept,
    /// Local reject.
    Reject,
    /// Local terminate.
    Terminate,
    /// Peer's initiate arrived.
    ReceiveInitiate,
    /// Peer's accept arrived.
    ReceiveAccept,
    /// Peer's reject arrived.
    ReceiveReject,
    /// Peer's terminate arrived.
    ReceiveTerminate,
}

impl std::fmt::Display for SessionOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initiate => "initiate",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Terminate => "terminate",
            Self::ReceiveInitiate => "receive initiate",
            Self::ReceiveAccept => "receive accept",
            Self::ReceiveReject => "receive reject",
            Self::ReceiveTerminate => "receive terminate",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [SessionState; 11] = [
        SessionState::Init,
        SessionState::SentInitiate,
        SessionState::ReceivedInitiate,
        SessionState::SentAccept,
        SessionState::ReceivedAccept,
        SessionState::SentModify,
        SessionState::ReceivedModify,
        SessionState::SentReject,
        SessionState::ReceivedReject,
        SessionState::SentTerminate,
        SessionState::ReceivedTerminate,
    ];

    #[test]
    fn initiate_only_from_init() {
        for state in ALL_STATES {
            let next = state.apply(SessionOp::Initiate);
            if state == SessionState::Init {
                assert_eq!(next, Some(SessionState::SentInitiate));
            } else {
                assert_eq!(next, None, "initiate allowed from {}", state);
            }
        }
    }

    #[test]
    fn reject_from_received_initiate_or_modify() {
        assert_eq!(
            SessionState::ReceivedInitiate.apply(SessionOp::Reject),
            Some(SessionState::SentReject)
        );
        assert_eq!(
            SessionState::ReceivedModify.apply(SessionOp::Reject),
            Some(SessionState::SentReject)
        );
        assert_eq!(SessionState::SentAccept.apply(SessionOp::Reject), None);
        assert_eq!(SessionState::Init.apply(SessionOp::Reject), None);
    }

    #[test]
    fn terminate_from_any_non_terminal() {
        for state in ALL_STATES {
            let next = state.apply(SessionOp::Terminate);
            if state.is_terminal() {
                assert_eq!(next, None);
            } else {
                assert_eq!(next, Some(SessionState::SentTerminate));
            }
        }
    }

    #[test]
    fn no_transition_reenters_init() {
        for state in ALL_STATES {
            assert!(!state.can_transition_to(SessionState::Init));
        }
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::SentTerminate.is_terminal());
        assert!(SessionState::ReceivedTerminate.is_terminal());
        assert!(!SessionState::SentReject.is_terminal());
        assert!(SessionState::ReceivedReject.is_rejected());
    }

    #[test]
    fn state_serde() {
        let json = serde_json::to_string(&SessionState::SentInitiate).unwrap();
        assert_eq!(json, "\"SENT_INITIATE\"");
        assert_eq!(SessionState::SentInitiate.to_string(), "SENT_INITIATE");
    }
}
