//! Session state machine.
//!
//! A [`Session`] is driven from a single control context: local operations
//! (`initiate`, `accept`, `reject`, `terminate_with_reason`), inbound stanzas
//! (see `dispatch`), and transport notices. Work that must not run inside the
//! caller's frame is posted to the session's [`TaskQueue`] and delivered by
//! [`Session::process_messages`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ppsession_core::{
    MessageBody, SessionContents, SessionDescription, SessionError, SessionErrorKind,
    SessionMessage, SessionOp, SessionResult, SessionState, SessionTerminate, Stanza,
    TransportInfo, TERMINATE_ERROR, TERMINATE_SUCCESS,
};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::queue::TaskQueue;
use crate::signal::{SessionEvent, SessionSignal};
use crate::transport::{ProxyRegistry, TransportFactory, TransportNotice, TransportProxy};

/// Messages a session posts to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SelfMessage {
    /// Writability watchdog expired.
    Timeout,
    /// A fatal error was recorded.
    Error,
    /// The session entered this state.
    State(SessionState),
}

/// One negotiation between us and a single peer.
pub struct Session {
    pub(crate) id: String,
    pub(crate) local_name: String,
    pub(crate) remote_name: String,
    pub(crate) is_initiator: bool,
    pub(crate) config: SessionConfig,
    pub(crate) state: SessionState,
    pub(crate) initiate_acked: bool,
    pub(crate) pending_initiate: Option<String>,
    /// Transport infos sent before the accept, by correlation id.
    pub(crate) early_transport_infos: Vec<(String, TransportInfo)>,
    pub(crate) local_description: Option<SessionDescription>,
    pub(crate) remote_description: Option<SessionDescription>,
    pub(crate) last_error: SessionErrorKind,
    pub(crate) proxies: ProxyRegistry,
    pub(crate) factory: Arc<dyn TransportFactory>,
    pub(crate) queue: TaskQueue<SelfMessage>,
    pub(crate) events: VecDeque<SessionEvent>,
    created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_name", &self.remote_name)
            .field("is_initiator", &self.is_initiator)
            .field("state", &self.state)
            .field("initiate_acked", &self.initiate_acked)
            .field("last_error", &self.last_error)
            .field("proxies", &self.proxies)
            .finish()
    }
}

impl Session {
    /// Create a session with the given id.
    pub fn new(
        id: impl Into<String>,
        remote_name: impl Into<String>,
        is_initiator: bool,
        config: SessionConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            id: id.into(),
            local_name: config.local_name.clone(),
            remote_name: remote_name.into(),
            is_initiator,
            config,
            state: SessionState::Init,
            initiate_acked: false,
            pending_initiate: None,
            early_transport_infos: Vec::new(),
            local_description: None,
            remote_description: None,
            last_error: SessionErrorKind::None,
            proxies: ProxyRegistry::new(),
            factory,
            queue: TaskQueue::new(),
            events: VecDeque::new(),
            created_at: Utc::now(),
        }
    }

    /// Create an outgoing session with a fresh id.
    pub fn outgoing(
        remote_name: impl Into<String>,
        config: SessionConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            remote_name,
            true,
            config,
            factory,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    pub fn initiate_acked(&self) -> bool {
        self.initiate_acked
    }

    pub fn last_error(&self) -> SessionErrorKind {
        self.last_error
    }

    pub fn transport_type(&self) -> &str {
        &self.config.transport_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn transport_proxy(&self, content_name: &str) -> Option<&TransportProxy> {
        self.proxies.get(content_name)
    }

    pub fn transport_proxies(&self) -> impl Iterator<Item = &TransportProxy> {
        self.proxies.iter()
    }

    /// Start a session by offering `description`. Only legal from `INIT`.
    pub fn initiate(&mut self, description: SessionDescription) -> SessionResult<()> {
        let next = self.next_state(SessionOp::Initiate)?;

        // One proxy per offered content, candidates follow separately
        let transports = self.empty_transport_infos(&description.contents);
        if let Err(e) = self.create_transport_proxies(&transports) {
            error!("Could not create transports: {}", e);
            return Err(e);
        }
        self.local_description = Some(description.clone());

        let body = MessageBody::Initiate(SessionContents {
            contents: description.contents,
            transports,
            groups: description.groups,
        });
        match self.send_message(body) {
            Ok(id) => self.pending_initiate = Some(id),
            Err(e) => {
                error!("Could not send initiate message: {}", e);
                return Err(e);
            }
        }

        // Transition: INIT -> SENT_INITIATE
        self.set_state(next);

        // Start connecting before the peer answers
        self.speculatively_connect_all_transport_channels();
        Ok(())
    }

    /// Accept the peer's offer with our `description`.
    pub fn accept(&mut self, description: SessionDescription) -> SessionResult<()> {
        let next = self.next_state(SessionOp::Accept)?;

        let transports = self.empty_transport_infos(&description.contents);
        if let Err(e) = self.create_transport_proxies(&transports) {
            error!("Could not create transports: {}", e);
            return Err(e);
        }
        self.local_description = Some(description.clone());

        let body = MessageBody::Accept(SessionContents {
            contents: description.contents,
            transports,
            groups: description.groups,
        });
        if let Err(e) = self.send_message(body) {
            error!("Could not send accept message: {}", e);
            return Err(e);
        }

        self.maybe_enable_muxing_support();

        // Transition: RECEIVED_INITIATE -> SENT_ACCEPT
        self.set_state(next);
        Ok(())
    }

    /// Reject the peer's initiate or modify.
    pub fn reject(&mut self, reason: &str) -> SessionResult<()> {
        let next = self.next_state(SessionOp::Reject)?;

        if let Err(e) = self.send_message(MessageBody::Reject(SessionTerminate::new(reason))) {
            error!("Could not send reject message: {}", e);
            return Err(e);
        }

        self.set_state(next);
        Ok(())
    }

    /// Terminate cleanly.
    pub fn terminate(&mut self) -> SessionResult<()> {
        self.terminate_with_reason(TERMINATE_SUCCESS)
    }

    /// Terminate from any non-terminal state.
    ///
    /// After a reject no terminate message is sent; the reject already ended
    /// the session on the wire.
    pub fn terminate_with_reason(&mut self, reason: &str) -> SessionResult<()> {
        let next = self.next_state(SessionOp::Terminate)?;

        if !self.state.is_rejected() {
            let body = MessageBody::Terminate(SessionTerminate::new(reason));
            if let Err(e) = self.send_message(body) {
                error!("Could not send terminate message: {}", e);
                return Err(e);
            }
        }

        self.set_state(next);
        Ok(())
    }

    /// Send an application info payload to the peer.
    pub fn send_info_message(&mut self, payload: serde_json::Value) -> SessionResult<()> {
        if self.state.is_terminal() {
            return Err(SessionError::Terminated(self.id.clone()));
        }
        if let Err(e) = self.send_message(MessageBody::Info { payload }) {
            error!("Could not send info message {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Register a media channel on a content, creating its proxy if needed.
    ///
    /// A bundled content's channel is also realised on the leader's transport.
    pub fn create_channel(&mut self, content_name: &str, channel_name: &str) {
        let proxy = self.get_or_create_transport_proxy(content_name);
        proxy.create_channel(channel_name);
        let Some(leader) = proxy.muxed_with().map(str::to_string) else {
            return;
        };
        if let Some(leader) = self.proxies.get_mut(&leader) {
            leader.create_channel(channel_name);
        }
    }

    /// Record a fatal error. Termination follows asynchronously.
    pub fn set_error(&mut self, kind: SessionErrorKind) {
        self.last_error = kind;
        if kind != SessionErrorKind::None {
            warn!("Session {} error: {}", self.id, kind);
            self.queue.post(SelfMessage::Error);
        }
    }

    /// Signaling is ready; let every transport send its own messages.
    pub fn on_signaling_ready(&mut self) {
        for proxy in self.proxies.iter_mut() {
            proxy.transport_mut().on_signaling_ready();
        }
    }

    /// Dispatch a notice from the transport of `content_name`.
    pub fn on_transport_notice(&mut self, content_name: &str, notice: TransportNotice) {
        match notice {
            TransportNotice::RequestSignaling => self.on_transport_request_signaling(content_name),
            TransportNotice::Connecting => self.on_transport_connecting(content_name),
            TransportNotice::WritableChanged => self.on_transport_writable(content_name),
            TransportNotice::CandidatesReady(candidates) => {
                self.on_transport_candidates_ready(content_name, &candidates)
            }
            TransportNotice::SendError { stanza_id, error } => {
                self.on_transport_send_error(&stanza_id, error)
            }
            TransportNotice::ChannelGone(channel) => {
                self.on_transport_channel_gone(content_name, &channel)
            }
        }
    }

    pub fn on_transport_request_signaling(&mut self, content_name: &str) {
        debug!("Transport {} requests signaling", content_name);
        self.emit(SessionSignal::RequestSignaling);
    }

    /// Connecting is the cue to start watching writability.
    pub fn on_transport_connecting(&mut self, content_name: &str) {
        self.on_transport_writable(content_name);
    }

    /// Re-arm the writability watchdog.
    ///
    /// A transport that has channels but cannot write must become writable
    /// within the configured timeout or the session fails. Writability may
    /// flip many times over the session's life.
    pub fn on_transport_writable(&mut self, content_name: &str) {
        self.queue.clear(&SelfMessage::Timeout);

        let Some(proxy) = self.proxies.get(content_name) else {
            warn!("Writability change for unknown content {}", content_name);
            return;
        };
        let transport = proxy.transport();
        if transport.has_channels() && !transport.writable() {
            debug!(
                "Transport {} not writable, arming {:?} watchdog",
                content_name, self.config.writable_timeout
            );
            let armed = self.queue.post_delayed(
                Instant::now(),
                self.config.writable_timeout,
                SelfMessage::Timeout,
            );
            if !armed {
                warn!(
                    "Watchdog timeout {:?} out of range, not armed",
                    self.config.writable_timeout
                );
            }
        }
    }

    pub fn on_transport_send_error(&mut self, stanza_id: &str, error: ppsession_core::MessageError) {
        self.emit(SessionSignal::ErrorMessage {
            stanza_id: stanza_id.to_string(),
            error_type: ppsession_core::message::ERROR_TYPE_MODIFY.to_string(),
            error,
        });
    }

    pub fn on_transport_channel_gone(&mut self, content_name: &str, channel_name: &str) {
        self.emit(SessionSignal::ChannelGone {
            content_name: content_name.to_string(),
            channel_name: channel_name.to_string(),
        });
    }

    /// Earliest time a posted message becomes deliverable.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.next_deadline()
    }

    /// Whether a posted message is deliverable at `now`.
    pub fn has_ready_messages(&self, now: Instant) -> bool {
        self.queue.has_ready(now)
    }

    /// Deliver every posted message that is due at `now`.
    pub fn process_messages(&mut self, now: Instant) {
        while let Some(message) = self.queue.pop(now) {
            self.on_message(message);
        }
    }

    /// Next pending signal.
    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    fn on_message(&mut self, message: SelfMessage) {
        match message {
            SelfMessage::Timeout => {
                warn!("Session {} transport not writable in time", self.id);
                self.set_error(SessionErrorKind::Time);
            }
            SelfMessage::Error => {
                if let Err(e) = self.terminate_with_reason(TERMINATE_ERROR) {
                    debug!("Terminate after error skipped: {}", e);
                }
            }
            SelfMessage::State(state) => {
                self.emit(SessionSignal::StateChanged(state));
                match state {
                    SessionState::SentReject | SessionState::ReceivedReject => {
                        // A reject ends the session cleanly.
                        if let Err(e) = self.terminate() {
                            debug!("Terminate after reject skipped: {}", e);
                        }
                    }
                    SessionState::SentTerminate | SessionState::ReceivedTerminate => {
                        info!("Session {} released in {}", self.id, state);
                        self.emit(SessionSignal::Released);
                    }
                    _ => {}
                }
            }
        }
    }

    pub(crate) fn next_state(&self, op: SessionOp) -> SessionResult<SessionState> {
        self.state.apply(op).ok_or(SessionError::InvalidState {
            op,
            state: self.state,
        })
    }

    pub(crate) fn set_state(&mut self, next: SessionState) {
        debug!("Session {} state: {} -> {}", self.id, self.state, next);
        self.state = next;
        if next.is_terminal() {
            self.queue.clear(&SelfMessage::Timeout);
        }
        self.queue.post(SelfMessage::State(next));
    }

    /// Queue a message to the peer and return its correlation id.
    pub(crate) fn send_message(&mut self, body: MessageBody) -> SessionResult<String> {
        if self.remote_name.is_empty() {
            return Err(SessionError::Send(format!(
                "no remote peer for session {}",
                self.id
            )));
        }
        let message = SessionMessage::new(&self.id, &self.local_name, &self.remote_name, body);
        let id = message.id.clone();
        debug!("Sending {} {} to {}", message.body.action(), id, self.remote_name);
        self.emit(SessionSignal::Outgoing(Stanza::Request(message)));
        Ok(id)
    }

    pub(crate) fn emit(&mut self, signal: SessionSignal) {
        self.events.push_back(SessionEvent {
            session_id: self.id.clone(),
            signal,
        });
    }
}
