//! Session manager: owns sessions and routes stanzas to them.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use ppsession_core::{
    MessageBody, MessageError, SessionError, SessionResult, SessionState, Stanza, StanzaErrorKind,
};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::session::Session;
use crate::signal::{SessionEvent, SessionSignal};
use crate::transport::TransportFactory;

/// Owner of every live session on this endpoint.
pub struct SessionManager {
    config: SessionConfig,
    factory: Arc<dyn TransportFactory>,
    sessions: HashMap<String, Session>,
    events: VecDeque<SessionEvent>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            config,
            factory,
            sessions: HashMap::new(),
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create an outgoing session to `remote_name` and return its id.
    pub fn create_session(&mut self, remote_name: &str) -> String {
        let session = Session::outgoing(remote_name, self.config.clone(), self.factory.clone());
        let sid = session.id().to_string();
        info!("Created session {} to {}", sid, remote_name);
        self.sessions.insert(sid.clone(), session);
        sid
    }

    pub fn session(&self, sid: &str) -> Option<&Session> {
        self.sessions.get(sid)
    }

    pub fn session_mut(&mut self, sid: &str) -> Option<&mut Session> {
        self.sessions.get_mut(sid)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Run a local operation against one session.
    pub fn with_session<T, F>(&mut self, sid: &str, op: F) -> SessionResult<T>
    where
        F: FnOnce(&mut Session) -> SessionResult<T>,
    {
        let session = self
            .sessions
            .get_mut(sid)
            .ok_or_else(|| SessionError::UnknownSession(sid.to_string()))?;
        let result = op(session);
        self.collect_events();
        result
    }

    /// Route an inbound stanza.
    ///
    /// An initiate for an unknown session id creates the responder session;
    /// any other request for an unknown session is answered with an error.
    pub fn on_stanza(&mut self, stanza: &Stanza) {
        let sid = stanza.sid().to_string();
        if let Some(session) = self.sessions.get_mut(&sid) {
            session.on_stanza(stanza);
        } else {
            match stanza {
                Stanza::Request(message) if matches!(message.body, MessageBody::Initiate(_)) => {
                    info!("Incoming session {} from {}", sid, message.from);
                    let mut session = Session::new(
                        sid.clone(),
                        message.from.clone(),
                        false,
                        self.config.clone(),
                        self.factory.clone(),
                    );
                    session.on_incoming_message(message);
                    if session.state() == SessionState::Init {
                        // Initiate refused; only the error response survives.
                        debug!("Discarding session {} after refused initiate", sid);
                        self.events.extend(std::iter::from_fn(|| session.poll_event()));
                    } else {
                        self.sessions.insert(sid, session);
                    }
                }
                Stanza::Request(message) => {
                    debug!("{} for unknown session {}", message.body.action(), sid);
                    let error =
                        MessageError::new(StanzaErrorKind::ItemNotFound, "unknown session");
                    self.events.push_back(SessionEvent {
                        session_id: sid,
                        signal: SessionSignal::Outgoing(message.error_response(error)),
                    });
                }
                _ => debug!("Dropping response {} for unknown session {}", stanza.id(), sid),
            }
        }
        self.collect_events();
    }

    /// Deliver due self-messages in every session.
    pub fn process_messages(&mut self, now: Instant) {
        for session in self.sessions.values_mut() {
            session.process_messages(now);
        }
        self.collect_events();
    }

    /// Earliest deadline across all sessions.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sessions
            .values()
            .filter_map(Session::next_deadline)
            .min()
    }

    /// Whether any session has a message deliverable at `now`.
    pub fn has_ready_messages(&self, now: Instant) -> bool {
        self.sessions.values().any(|s| s.has_ready_messages(now))
    }

    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// Remove a session outright.
    pub fn destroy_session(&mut self, sid: &str) -> Option<Session> {
        let session = self.sessions.remove(sid);
        if session.is_some() {
            info!("Destroyed session {}", sid);
        }
        session
    }

    fn collect_events(&mut self) {
        let mut released = Vec::new();
        for session in self.sessions.values_mut() {
            while let Some(event) = session.poll_event() {
                if event.signal == SessionSignal::Released {
                    released.push(event.session_id.clone());
                }
                self.events.push_back(event);
            }
        }
        for sid in released {
            self.destroy_session(&sid);
        }
    }
}
