//! Inbound message dispatch.
//!
//! Every request is routed by action type to a handler returning
//! `Result<(), MessageError>`. The dispatcher alone turns that into an
//! acknowledgement or an error response.

use ppsession_core::{
    ErrorExtra, MessageBody, MessageError, SessionContents, SessionErrorKind, SessionMessage,
    SessionOp, SessionState, SessionTerminate, Stanza, TransportInfo,
};
use tracing::{debug, warn};

use crate::session::Session;
use crate::signal::SessionSignal;

impl Session {
    /// Handle any stanza addressed to this session.
    pub fn on_stanza(&mut self, stanza: &Stanza) {
        match stanza {
            Stanza::Request(message) => self.on_incoming_message(message),
            Stanza::Result { id, .. } => self.on_response_received(id),
            Stanza::Error { id, error, .. } => self.on_failed_send(id, error),
        }
    }

    /// Dispatch a request and answer it.
    pub fn on_incoming_message(&mut self, message: &SessionMessage) {
        let result = match &message.body {
            MessageBody::Initiate(contents) => self.on_initiate_message(&message.from, contents),
            MessageBody::Accept(contents) => self.on_accept_message(contents),
            MessageBody::Reject(term) => self.on_reject_message(term),
            MessageBody::Terminate(term) => self.on_terminate_message(term),
            MessageBody::Info { payload } => self.on_info_message(payload),
            MessageBody::TransportInfo { transports } => self.on_transport_info_message(transports),
            MessageBody::Unknown => Err(MessageError::bad_parse("unknown session message type")),
        };

        match result {
            Ok(()) => self.emit(SessionSignal::Outgoing(message.ack())),
            Err(error) => {
                warn!(
                    "Rejecting {} {} in {}: {}",
                    message.body.action(),
                    message.id,
                    self.state,
                    error
                );
                self.emit(SessionSignal::Outgoing(message.error_response(error)));
            }
        }
    }

    fn on_initiate_message(
        &mut self,
        from: &str,
        contents: &SessionContents,
    ) -> Result<(), MessageError> {
        let next = self.check_state(SessionOp::ReceiveInitiate)?;

        // Proxies first: a foreign transport type refuses the whole offer
        self.create_transport_proxies(&contents.transports)
            .map_err(|e| {
                MessageError::new(ppsession_core::StanzaErrorKind::NotAcceptable, e.to_string())
            })?;

        if self.remote_name.is_empty() {
            self.remote_name = from.to_string();
        }
        self.remote_description = Some(contents.description());

        // Transition: INIT -> RECEIVED_INITIATE
        self.set_state(next);

        // Candidates carried in the offer itself
        self.on_remote_candidates(&contents.transports)
    }

    fn on_accept_message(&mut self, contents: &SessionContents) -> Result<(), MessageError> {
        let next = self.check_state(SessionOp::ReceiveAccept)?;

        // An accept proves the initiate arrived, ack or not.
        self.on_initiate_acked();

        self.remote_description = Some(contents.description());
        self.maybe_enable_muxing_support();

        // Transition: SENT_INITIATE -> RECEIVED_ACCEPT
        self.set_state(next);

        let applied = self.on_remote_candidates(&contents.transports);

        // The peer has its channels now; resend what it refused before.
        if let Err(e) = self.send_all_unsent_transport_info_messages() {
            warn!("Could not resend held transport info messages: {}", e);
        }
        applied
    }

    fn on_reject_message(&mut self, term: &SessionTerminate) -> Result<(), MessageError> {
        let next = self.check_state(SessionOp::ReceiveReject)?;
        debug!("Session {} rejected: {}", self.id, term.reason);

        // Transition: SENT_INITIATE -> RECEIVED_REJECT, terminate follows
        self.set_state(next);
        Ok(())
    }

    fn on_info_message(&mut self, payload: &serde_json::Value) -> Result<(), MessageError> {
        self.emit(SessionSignal::InfoMessage(payload.clone()));
        Ok(())
    }

    fn on_terminate_message(&mut self, term: &SessionTerminate) -> Result<(), MessageError> {
        if self.state.is_terminal() {
            debug!("Session {} already terminated, ignoring terminate", self.id);
            return Ok(());
        }
        let next = self.check_state(SessionOp::ReceiveTerminate)?;

        self.emit(SessionSignal::ReceivedTerminateReason(term.reason.clone()));
        if let Some(debug_reason) = term.debug_reason.as_deref().filter(|r| !r.is_empty()) {
            debug!("Received error on call: {}", debug_reason);
        }

        self.set_state(next);
        Ok(())
    }

    fn on_transport_info_message(
        &mut self,
        transports: &[TransportInfo],
    ) -> Result<(), MessageError> {
        if self.state == SessionState::Init || self.state.is_terminal() {
            return Err(MessageError::not_allowed());
        }
        self.on_remote_candidates(transports)
    }

    /// The peer acknowledged one of our requests.
    fn on_response_received(&mut self, id: &str) {
        if self.pending_initiate.as_deref() == Some(id) {
            self.pending_initiate = None;
            self.on_initiate_acked();
        } else if let Some(pos) = self
            .early_transport_infos
            .iter()
            .position(|(sent, _)| sent == id)
        {
            self.early_transport_infos.remove(pos);
        } else {
            debug!("Session {} got ack for {}", self.id, id);
        }
    }

    /// The peer answered one of our requests with an error.
    fn on_failed_send(&mut self, id: &str, error: &MessageError) {
        if self.state.is_terminal() {
            debug!("Ignoring error for {} after termination: {}", id, error);
            return;
        }
        if matches!(error.extra, Some(ErrorExtra::UnknownChannelName { .. })) {
            // Transport-level complaint; the session itself is fine.
            if self.requeue_refused_candidates(id) {
                return;
            }
            self.emit(SessionSignal::ErrorMessage {
                stanza_id: id.to_string(),
                error_type: ppsession_core::message::ERROR_TYPE_MODIFY.to_string(),
                error: error.clone(),
            });
            return;
        }
        warn!("Session {} request {} failed: {}", self.id, id, error);
        self.set_error(SessionErrorKind::Response);
    }

    fn check_state(&self, op: SessionOp) -> Result<SessionState, MessageError> {
        self.state.apply(op).ok_or_else(MessageError::not_allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use ppsession_core::{StanzaErrorKind, TERMINATE_SUCCESS};

    use crate::session::tests::{
        audio_video, candidate, drain, new_session, receive_initiate, sent_bodies,
    };

    fn request(body: MessageBody) -> SessionMessage {
        SessionMessage::new("sid-1", "bob@example.net", "alice@example.net", body)
    }

    fn responses(signals: &[SessionSignal]) -> Vec<Stanza> {
        signals
            .iter()
            .filter_map(|s| match s {
                SessionSignal::Outgoing(stanza @ (Stanza::Result { .. } | Stanza::Error { .. })) => {
                    Some(stanza.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn error_kind(stanza: &Stanza) -> Option<StanzaErrorKind> {
        match stanza {
            Stanza::Error { error, .. } => Some(error.kind),
            _ => None,
        }
    }

    #[test]
    fn unknown_type_is_bad_request() {
        let (mut session, _) = new_session(false);
        let msg = request(MessageBody::Unknown);
        session.on_incoming_message(&msg);

        let out = responses(&drain(&mut session));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), msg.id);
        assert_eq!(error_kind(&out[0]), Some(StanzaErrorKind::BadRequest));
    }

    #[test]
    fn accept_in_wrong_state_not_allowed() {
        let (mut session, _) = new_session(false);
        let msg = request(MessageBody::Accept(SessionContents::default()));
        session.on_incoming_message(&msg);

        assert_eq!(session.state(), SessionState::Init);
        assert!(!session.initiate_acked());
        let out = responses(&drain(&mut session));
        assert_eq!(error_kind(&out[0]), Some(StanzaErrorKind::NotAllowed));
    }

    #[test]
    fn initiate_with_foreign_transport_not_acceptable() {
        let (mut session, _) = new_session(false);
        let msg = request(MessageBody::Initiate(SessionContents {
            contents: audio_video().contents,
            transports: vec![TransportInfo::new("audio", "urn:other", vec![])],
            groups: vec![],
        }));
        session.on_incoming_message(&msg);

        assert_eq!(session.state(), SessionState::Init);
        assert!(session.remote_description().is_none());
        let out = responses(&drain(&mut session));
        assert_eq!(error_kind(&out[0]), Some(StanzaErrorKind::NotAcceptable));
    }

    #[test]
    fn initiate_acknowledged_and_remote_set() {
        let (mut session, _) = new_session(false);
        receive_initiate(&mut session, &audio_video());

        assert_eq!(session.state(), SessionState::ReceivedInitiate);
        assert_eq!(session.remote_description(), Some(&audio_video()));
        assert!(session.transport_proxies().all(|p| p.negotiated()));
        let out = responses(&drain(&mut session));
        assert!(matches!(out[0], Stanza::Result { .. }));
    }

    #[test]
    fn transport_info_for_unknown_content() {
        let (mut session, _) = new_session(false);
        receive_initiate(&mut session, &audio_video());
        drain(&mut session);

        let ty = session.transport_type().to_string();
        let msg = request(MessageBody::TransportInfo {
            transports: vec![TransportInfo::new("data", ty, vec![candidate("rtp", 4000)])],
        });
        session.on_incoming_message(&msg);

        assert_eq!(session.state(), SessionState::ReceivedInitiate);
        match &responses(&drain(&mut session))[0] {
            Stanza::Error { error, .. } => {
                assert_eq!(
                    error.extra,
                    Some(ErrorExtra::UnknownContentName {
                        content_name: "data".to_string()
                    })
                );
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn transport_info_before_initiate_not_allowed() {
        let (mut session, _) = new_session(false);
        let msg = request(MessageBody::TransportInfo { transports: vec![] });
        session.on_incoming_message(&msg);
        let out = responses(&drain(&mut session));
        assert_eq!(error_kind(&out[0]), Some(StanzaErrorKind::NotAllowed));
    }

    #[test]
    fn reject_message_terminates_without_sending() {
        let (mut session, _) = new_session(true);
        session.initiate(audio_video()).unwrap();
        drain(&mut session);

        session.on_incoming_message(&request(MessageBody::Reject(SessionTerminate::new(
            "busy",
        ))));
        assert_eq!(session.state(), SessionState::ReceivedReject);

        session.process_messages(Instant::now());
        assert_eq!(session.state(), SessionState::SentTerminate);
        let signals = drain(&mut session);
        assert!(!signals
            .iter()
            .any(|s| matches!(s, SessionSignal::Outgoing(Stanza::Request(_)))));
        assert!(signals.contains(&SessionSignal::Released));
    }

    #[test]
    fn terminate_message_reports_reason() {
        let (mut session, _) = new_session(false);
        receive_initiate(&mut session, &audio_video());
        drain(&mut session);

        let mut term = SessionTerminate::new(TERMINATE_SUCCESS);
        term.debug_reason = Some("hung up".to_string());
        session.on_incoming_message(&request(MessageBody::Terminate(term.clone())));
        assert_eq!(session.state(), SessionState::ReceivedTerminate);

        // A duplicate terminate is acknowledged without a transition.
        session.on_incoming_message(&request(MessageBody::Terminate(term)));
        assert_eq!(session.state(), SessionState::ReceivedTerminate);

        session.process_messages(Instant::now());
        let signals = drain(&mut session);
        assert!(signals.contains(&SessionSignal::ReceivedTerminateReason(
            TERMINATE_SUCCESS.to_string()
        )));
        assert!(responses(&signals)
            .iter()
            .all(|s| matches!(s, Stanza::Result { .. })));
        assert_eq!(
            signals.iter().filter(|s| **s == SessionSignal::Released).count(),
            1
        );
    }

    #[test]
    fn info_message_signalled() {
        let (mut session, _) = new_session(false);
        let payload = serde_json::json!({"hold": true});
        session.on_incoming_message(&request(MessageBody::Info {
            payload: payload.clone(),
        }));
        let signals = drain(&mut session);
        assert!(signals.contains(&SessionSignal::InfoMessage(payload)));
    }

    #[test]
    fn explicit_ack_flushes_candidates() {
        let (mut session, _) = new_session(true);
        session.create_channel("audio", "rtp");
        session.initiate(audio_video()).unwrap();
        let initiate_id = match drain(&mut session).into_iter().next() {
            Some(SessionSignal::Outgoing(stanza)) => stanza.id().to_string(),
            other => panic!("expected initiate, got {:?}", other),
        };
        session.on_transport_candidates_ready("audio", &[candidate("rtp", 4000)]);

        let unrelated = Stanza::Result {
            id: "other".to_string(),
            sid: "sid-1".to_string(),
            from: "bob@example.net".to_string(),
            to: "alice@example.net".to_string(),
        };
        session.on_stanza(&unrelated);
        assert!(!session.initiate_acked());

        let ack = Stanza::Result {
            id: initiate_id,
            sid: "sid-1".to_string(),
            from: "bob@example.net".to_string(),
            to: "alice@example.net".to_string(),
        };
        session.on_stanza(&ack);
        assert!(session.initiate_acked());
        assert!(session.transport_proxy("audio").unwrap().unsent_candidates().is_empty());
        assert_eq!(drain(&mut session).len(), 1);
    }

    #[test]
    fn error_response_fails_session() {
        let (mut session, _) = new_session(true);
        session.initiate(audio_video()).unwrap();
        drain(&mut session);

        let msg = request(MessageBody::Unknown);
        session.on_stanza(&msg.error_response(MessageError::not_allowed()));
        assert_eq!(session.last_error(), SessionErrorKind::Response);

        session.process_messages(Instant::now());
        assert_eq!(session.state(), SessionState::SentTerminate);
    }

    #[test]
    fn unknown_channel_error_only_signalled() {
        let (mut session, _) = new_session(true);
        session.initiate(audio_video()).unwrap();
        drain(&mut session);

        let error = MessageError::bad_parse("channel named in candidate does not exist")
            .with_extra(ErrorExtra::UnknownChannelName {
                content_name: "audio".to_string(),
                candidate_name: "rtcp".to_string(),
            });
        let msg = request(MessageBody::Unknown);
        session.on_stanza(&msg.error_response(error));

        assert_eq!(session.last_error(), SessionErrorKind::None);
        let signals = drain(&mut session);
        assert!(matches!(signals[0], SessionSignal::ErrorMessage { .. }));
    }

    #[test]
    fn refusal_after_accept_is_resent_at_once() {
        let (mut session, _) = new_session(true);
        session.create_channel("audio", "rtp");
        session.initiate(audio_video()).unwrap();
        let initiate_id = match drain(&mut session).into_iter().next() {
            Some(SessionSignal::Outgoing(stanza)) => stanza.id().to_string(),
            other => panic!("expected initiate, got {:?}", other),
        };
        session.on_stanza(&Stanza::Result {
            id: initiate_id,
            sid: "sid-1".to_string(),
            from: "bob@example.net".to_string(),
            to: "alice@example.net".to_string(),
        });
        session.on_transport_candidates_ready("audio", &[candidate("rtp", 4000)]);
        let info_id = match drain(&mut session).pop() {
            Some(SessionSignal::Outgoing(stanza)) => stanza.id().to_string(),
            other => panic!("expected transport info, got {:?}", other),
        };

        session.on_incoming_message(&request(MessageBody::Accept(SessionContents {
            contents: audio_video().contents,
            transports: session.empty_transport_infos(&audio_video().contents),
            groups: vec![],
        })));
        drain(&mut session);

        session.on_stanza(&Stanza::Error {
            id: info_id,
            sid: "sid-1".to_string(),
            from: "bob@example.net".to_string(),
            to: "alice@example.net".to_string(),
            error_type: "modify".to_string(),
            error: MessageError::bad_parse("channel named in candidate does not exist")
                .with_extra(ErrorExtra::UnknownChannelName {
                    content_name: "audio".to_string(),
                    candidate_name: "rtp".to_string(),
                }),
        });

        let signals = drain(&mut session);
        assert!(!signals
            .iter()
            .any(|s| matches!(s, SessionSignal::ErrorMessage { .. })));
        match sent_bodies(&signals).as_slice() {
            [MessageBody::TransportInfo { transports }] => {
                assert_eq!(transports[0].candidates, vec![candidate("rtp", 4000)]);
            }
            other => panic!("expected one transport info, got {:?}", other),
        }
        assert_eq!(session.last_error(), SessionErrorKind::None);
    }
}
