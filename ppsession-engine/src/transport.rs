//! Transport collaborators and the per-content transport proxy registry.
//!
//! The live channel implementation (connectivity checks, sockets) is an
//! external collaborator behind [`Transport`]. A session keeps one
//! [`TransportProxy`] per content name recording how far negotiation for that
//! content has progressed. Transports never hold a reference back to their
//! session; they report through [`TransportNotice`] addressed by content name.

use ppsession_core::{Candidate, MessageError};

/// Live channel set for one content.
pub trait Transport: Send {
    /// Create the implementation of a named channel.
    fn create_channel(&mut self, name: &str);

    /// Whether a channel with this name exists.
    fn has_channel(&self, name: &str) -> bool;

    /// Whether any channel exists.
    fn has_channels(&self) -> bool;

    /// Whether every channel can currently send.
    fn writable(&self) -> bool;

    /// Check a remote candidate before it is applied.
    fn verify_candidate(&self, _candidate: &Candidate) -> Result<(), MessageError> {
        Ok(())
    }

    /// Hand a batch of remote candidates to the channels.
    fn on_remote_candidates(&mut self, candidates: &[Candidate]);

    /// Start connectivity checks on all channels.
    fn connect_channels(&mut self);

    /// Signaling is available for the transport's own messages.
    fn on_signaling_ready(&mut self) {}
}

/// Creates transports for new proxies.
pub trait TransportFactory: Send + Sync {
    fn create_transport(
        &self,
        session_id: &str,
        content_name: &str,
        transport_type: &str,
    ) -> Box<dyn Transport>;
}

/// Notifications a transport delivers to its session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportNotice {
    /// The transport wants to send signaling.
    RequestSignaling,
    /// Connectivity checks started.
    Connecting,
    /// Writability changed.
    WritableChanged,
    /// Local candidates were discovered.
    CandidatesReady(Vec<Candidate>),
    /// A stanza the transport sent came back with an error.
    SendError {
        stanza_id: String,
        error: MessageError,
    },
    /// A channel was destroyed.
    ChannelGone(String),
}

/// Negotiation record for one content.
pub struct TransportProxy {
    content_name: String,
    transport_type: String,
    negotiated: bool,
    channels: Vec<String>,
    sent_candidates: Vec<Candidate>,
    unsent_candidates: Vec<Candidate>,
    muxed_with: Option<String>,
    transport: Box<dyn Transport>,
}

impl std::fmt::Debug for TransportProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportProxy")
            .field("content_name", &self.content_name)
            .field("transport_type", &self.transport_type)
            .field("negotiated", &self.negotiated)
            .field("channels", &self.channels)
            .field("sent_candidates", &self.sent_candidates.len())
            .field("unsent_candidates", &self.unsent_candidates.len())
            .field("muxed_with", &self.muxed_with)
            .field("transport", &"<transport>")
            .finish()
    }
}

impl TransportProxy {
    pub fn new(
        content_name: impl Into<String>,
        transport_type: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            content_name: content_name.into(),
            transport_type: transport_type.into(),
            negotiated: false,
            channels: Vec::new(),
            sent_candidates: Vec::new(),
            unsent_candidates: Vec::new(),
            muxed_with: None,
            transport,
        }
    }

    pub fn content_name(&self) -> &str {
        &self.content_name
    }

    pub fn transport_type(&self) -> &str {
        &self.transport_type
    }

    pub fn negotiated(&self) -> bool {
        self.negotiated
    }

    pub fn sent_candidates(&self) -> &[Candidate] {
        &self.sent_candidates
    }

    pub fn unsent_candidates(&self) -> &[Candidate] {
        &self.unsent_candidates
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channels
    }

    /// Content whose transport this one is multiplexed onto.
    pub fn muxed_with(&self) -> Option<&str> {
        self.muxed_with.as_deref()
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    /// Whether the media side registered this channel name.
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c == name)
    }

    /// Register a channel. Once negotiated, it is realised immediately.
    pub fn create_channel(&mut self, name: &str) {
        if !self.has_channel(name) {
            self.channels.push(name.to_string());
        }
        if self.negotiated && !self.transport.has_channel(name) {
            self.transport.create_channel(name);
        }
    }

    /// Realise channels and start connecting before negotiation completes.
    pub fn speculatively_connect_channels(&mut self) {
        self.realize_channels();
        self.transport.connect_channels();
    }

    /// Make the channel set live. Only the first call has an effect.
    pub fn complete_negotiation(&mut self) {
        if self.negotiated {
            return;
        }
        self.realize_channels();
        self.negotiated = true;
        self.transport.connect_channels();
    }

    pub fn add_sent_candidates(&mut self, candidates: &[Candidate]) {
        self.sent_candidates.extend_from_slice(candidates);
    }

    pub fn add_unsent_candidates(&mut self, candidates: &[Candidate]) {
        self.unsent_candidates.extend_from_slice(candidates);
    }

    pub fn clear_unsent_candidates(&mut self) {
        self.unsent_candidates.clear();
    }

    pub(crate) fn set_muxed_with(&mut self, leader: Option<String>) {
        self.muxed_with = leader;
    }

    fn realize_channels(&mut self) {
        for name in &self.channels {
            if !self.transport.has_channel(name) {
                self.transport.create_channel(name);
            }
        }
    }
}

/// Proxies keyed by content name, iterated in insertion order.
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    proxies: Vec<TransportProxy>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, content_name: &str) -> Option<&TransportProxy> {
        self.proxies.iter().find(|p| p.content_name == content_name)
    }

    pub fn get_mut(&mut self, content_name: &str) -> Option<&mut TransportProxy> {
        self.proxies
            .iter_mut()
            .find(|p| p.content_name == content_name)
    }

    pub fn contains(&self, content_name: &str) -> bool {
        self.get(content_name).is_some()
    }

    /// Return the proxy for `content_name`, building it with `create` if absent.
    pub fn get_or_insert_with<F>(&mut self, content_name: &str, create: F) -> &mut TransportProxy
    where
        F: FnOnce() -> TransportProxy,
    {
        let index = match self
            .proxies
            .iter()
            .position(|p| p.content_name == content_name)
        {
            Some(index) => index,
            None => {
                self.proxies.push(create());
                self.proxies.len() - 1
            }
        };
        &mut self.proxies[index]
    }

    pub fn content_names(&self) -> Vec<String> {
        self.proxies.iter().map(|p| p.content_name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransportProxy> {
        self.proxies.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TransportProxy> {
        self.proxies.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
