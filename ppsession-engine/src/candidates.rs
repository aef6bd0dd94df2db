//! Transport proxy creation and candidate exchange for a session.

use ppsession_core::{
    Candidate, ContentInfo, ErrorExtra, MessageBody, MessageError, SessionError, SessionResult,
    SessionState, TransportInfo, GROUP_TYPE_BUNDLE,
};
use tracing::{debug, error, info};

use crate::session::Session;
use crate::transport::TransportProxy;

impl Session {
    /// One candidate-less transport info per content.
    pub fn empty_transport_infos(&self, contents: &[ContentInfo]) -> Vec<TransportInfo> {
        contents
            .iter()
            .map(|content| {
                TransportInfo::new(&content.name, &self.config.transport_type, Vec::new())
            })
            .collect()
    }

    /// Return the proxy for `content_name`, creating it on first use.
    pub fn get_or_create_transport_proxy(&mut self, content_name: &str) -> &mut TransportProxy {
        let factory = &self.factory;
        let session_id = &self.id;
        let transport_type = &self.config.transport_type;
        self.proxies.get_or_insert_with(content_name, || {
            debug!("Creating transport proxy for {}", content_name);
            let transport = factory.create_transport(session_id, content_name, transport_type);
            TransportProxy::new(content_name, transport_type.as_str(), transport)
        })
    }

    /// Create proxies for a batch of transport infos.
    ///
    /// The whole batch is checked before anything is created, so a type
    /// mismatch leaves the registry untouched.
    pub fn create_transport_proxies(&mut self, transports: &[TransportInfo]) -> SessionResult<()> {
        if let Some(bad) = transports
            .iter()
            .find(|t| t.transport_type != self.config.transport_type)
        {
            return Err(SessionError::UnsupportedTransport {
                content_name: bad.content_name.clone(),
                transport_type: bad.transport_type.clone(),
            });
        }

        for transport in transports {
            self.get_or_create_transport_proxy(&transport.content_name);
        }
        Ok(())
    }

    /// Apply candidates the peer sent.
    ///
    /// Every entry is validated first: its content must have a proxy, and each
    /// candidate must pass the transport's check and name a channel known to
    /// the proxy. Only then is negotiation completed for each proxy and the
    /// candidates handed over, so a failing batch applies nothing.
    pub fn on_remote_candidates(&mut self, transports: &[TransportInfo]) -> Result<(), MessageError> {
        for info in transports {
            let Some(proxy) = self.proxies.get(&info.content_name) else {
                return Err(
                    MessageError::bad_parse(format!("Unknown content name: {}", info.content_name))
                        .with_extra(ErrorExtra::UnknownContentName {
                            content_name: info.content_name.clone(),
                        }),
                );
            };

            for candidate in &info.candidates {
                proxy.transport().verify_candidate(candidate)?;

                if !proxy.has_channel(&candidate.name) {
                    return Err(MessageError::bad_parse(format!(
                        "channel named in candidate does not exist: {} for content: {}",
                        candidate.name, info.content_name
                    ))
                    .with_extra(ErrorExtra::UnknownChannelName {
                        content_name: info.content_name.clone(),
                        candidate_name: candidate.name.clone(),
                    }));
                }
            }
        }

        for info in transports {
            let Some(proxy) = self.proxies.get_mut(&info.content_name) else {
                continue;
            };
            // Negotiation must complete first or there are no channel impls.
            proxy.complete_negotiation();
            if info.candidates.is_empty() {
                continue;
            }
            // Bundled contents are carried by the leader's transport.
            let carrier = proxy
                .muxed_with()
                .unwrap_or(info.content_name.as_str())
                .to_string();
            if let Some(carrier) = self.proxies.get_mut(&carrier) {
                carrier.transport_mut().on_remote_candidates(&info.candidates);
            }
        }
        Ok(())
    }

    /// Local candidates discovered by the transport of `content_name`.
    pub fn on_transport_candidates_ready(&mut self, content_name: &str, candidates: &[Candidate]) {
        let initiator_waiting = self.is_initiator && !self.initiate_acked;
        let Some(proxy) = self.proxies.get_mut(content_name) else {
            debug!("Candidates for unknown content {} dropped", content_name);
            return;
        };
        if let Some(leader) = proxy.muxed_with() {
            debug!("Candidates for {} dropped, bundled onto {}", content_name, leader);
            return;
        }

        if initiator_waiting {
            // The signaling server may reorder messages, so candidates wait
            // until the initiate is acked.
            proxy.add_unsent_candidates(candidates);
            return;
        }

        if !proxy.negotiated() {
            proxy.add_sent_candidates(candidates);
        }
        let info = TransportInfo::new(content_name, proxy.transport_type(), candidates.to_vec());
        if let Err(e) = self.send_transport_info_message(info) {
            error!("Could not send transport info message: {}", e);
        }
    }

    /// The peer has seen our initiate. Only the first call has an effect.
    pub fn on_initiate_acked(&mut self) {
        if self.initiate_acked {
            return;
        }
        self.initiate_acked = true;
        if let Err(e) = self.send_all_unsent_transport_info_messages() {
            error!("Could not send unsent transport info messages: {}", e);
        }
    }

    /// Share a transport with every bundled content when both sides bundle.
    pub(crate) fn maybe_enable_muxing_support(&mut self) {
        let (Some(local), Some(remote)) = (&self.local_description, &self.remote_description)
        else {
            return;
        };
        let (Some(local_group), Some(remote_group)) = (
            local.get_group_by_name(GROUP_TYPE_BUNDLE),
            remote.get_group_by_name(GROUP_TYPE_BUNDLE),
        ) else {
            return;
        };

        let bundled: Vec<String> = local_group
            .content_names
            .iter()
            .filter(|name| remote_group.has_content_name(name))
            .filter(|name| self.proxies.contains(name))
            .cloned()
            .collect();
        let Some((leader, followers)) = bundled.split_first() else {
            return;
        };

        info!("Muxing {:?} onto transport of {}", followers, leader);
        for name in followers {
            let Some(proxy) = self.proxies.get_mut(name) else {
                continue;
            };
            proxy.set_muxed_with(Some(leader.clone()));
            // Anything still queued for the follower is covered by the leader.
            proxy.clear_unsent_candidates();
            let channels = proxy.channel_names().to_vec();
            if let Some(leader_proxy) = self.proxies.get_mut(leader) {
                for channel in &channels {
                    leader_proxy.create_channel(channel);
                }
            }
        }
    }

    pub(crate) fn speculatively_connect_all_transport_channels(&mut self) {
        for proxy in self.proxies.iter_mut() {
            proxy.speculatively_connect_channels();
        }
    }

    /// The peer refused an early transport info because the channel it
    /// names was not registered yet. Hold its candidates for the accept, or
    /// resend them at once if the accept already arrived.
    pub(crate) fn requeue_refused_candidates(&mut self, stanza_id: &str) -> bool {
        let Some(pos) = self
            .early_transport_infos
            .iter()
            .position(|(id, _)| id == stanza_id)
        else {
            return false;
        };
        let (_, info) = self.early_transport_infos.remove(pos);

        if self.state == SessionState::SentInitiate {
            let Some(proxy) = self.proxies.get_mut(&info.content_name) else {
                return false;
            };
            debug!(
                "Holding {} refused candidates for {} until accept",
                info.candidates.len(),
                info.content_name
            );
            proxy.add_unsent_candidates(&info.candidates);
        } else if let Err(e) = self.send_transport_info_message(info) {
            error!("Could not resend transport info message: {}", e);
        }
        true
    }

    pub(crate) fn send_all_unsent_transport_info_messages(&mut self) -> SessionResult<()> {
        for name in self.proxies.content_names() {
            let Some(proxy) = self.proxies.get(&name) else {
                continue;
            };
            if proxy.unsent_candidates().is_empty() {
                continue;
            }
            let info = TransportInfo::new(
                &name,
                proxy.transport_type(),
                proxy.unsent_candidates().to_vec(),
            );
            self.send_transport_info_message(info)?;
            if let Some(proxy) = self.proxies.get_mut(&name) {
                proxy.clear_unsent_candidates();
            }
        }
        Ok(())
    }

    fn send_transport_info_message(&mut self, info: TransportInfo) -> SessionResult<()> {
        // Until the accept, the peer may not have registered its channels yet.
        let early = self.is_initiator && self.state == SessionState::SentInitiate;
        let id = self.send_message(MessageBody::TransportInfo {
            transports: vec![info.clone()],
        })?;
        if early {
            self.early_transport_infos.push((id, info));
        }
        Ok(())
    }
}
