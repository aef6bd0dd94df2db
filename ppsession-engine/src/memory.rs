//! In-memory transport used by the loopback binary and tests.
//!
//! Nothing is put on a network: channels are names, writability is a flag
//! the owner flips, and remote candidates are recorded for inspection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ppsession_core::{Candidate, MessageError};

use crate::transport::{Transport, TransportFactory};

#[derive(Debug, Default)]
struct MemoryState {
    channels: Vec<String>,
    writable: bool,
    connect_calls: usize,
    signaling_ready: bool,
    remote_candidates: Vec<Candidate>,
    remote_batches: usize,
}

/// Shared-state transport; clones observe the same channels.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flip the writability flag. The session still has to be told.
    pub fn set_writable(&self, writable: bool) {
        self.lock().writable = writable;
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.lock().channels.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    pub fn signaling_ready(&self) -> bool {
        self.lock().signaling_ready
    }

    /// Every remote candidate applied so far, in order.
    pub fn remote_candidates(&self) -> Vec<Candidate> {
        self.lock().remote_candidates.clone()
    }

    /// Number of batches handed over by `on_remote_candidates`.
    pub fn remote_batches(&self) -> usize {
        self.lock().remote_batches
    }
}

impl Transport for MemoryTransport {
    fn create_channel(&mut self, name: &str) {
        let mut state = self.lock();
        if !state.channels.iter().any(|c| c == name) {
            state.channels.push(name.to_string());
        }
    }

    fn has_channel(&self, name: &str) -> bool {
        self.lock().channels.iter().any(|c| c == name)
    }

    fn has_channels(&self) -> bool {
        !self.lock().channels.is_empty()
    }

    fn writable(&self) -> bool {
        self.lock().writable
    }

    fn verify_candidate(&self, candidate: &Candidate) -> Result<(), MessageError> {
        if candidate.address.port() == 0 {
            return Err(MessageError::bad_parse(format!(
                "candidate for {} has no port",
                candidate.name
            )));
        }
        Ok(())
    }

    fn on_remote_candidates(&mut self, candidates: &[Candidate]) {
        let mut state = self.lock();
        state.remote_candidates.extend_from_slice(candidates);
        state.remote_batches += 1;
    }

    fn connect_channels(&mut self) {
        self.lock().connect_calls += 1;
    }

    fn on_signaling_ready(&mut self) {
        self.lock().signaling_ready = true;
    }
}

/// Factory that remembers every transport it built.
#[derive(Debug, Default)]
pub struct MemoryTransportFactory {
    created: Mutex<Vec<(String, String, MemoryTransport)>>,
}

impl MemoryTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle on the transport built for `(session_id, content_name)`.
    pub fn transport(&self, session_id: &str, content_name: &str) -> Option<MemoryTransport> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(sid, content, _)| sid == session_id && content == content_name)
            .map(|(_, _, transport)| transport.clone())
    }

    /// Number of transports built so far.
    pub fn created_count(&self) -> usize {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn create_transport(
        &self,
        session_id: &str,
        content_name: &str,
        transport_type: &str,
    ) -> Box<dyn Transport> {
        tracing::debug!(
            "Creating memory transport {} for {}/{}",
            transport_type,
            session_id,
            content_name
        );
        let transport = MemoryTransport::new();
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((
                session_id.to_string(),
                content_name.to_string(),
                transport.clone(),
            ));
        Box::new(transport)
    }
}
