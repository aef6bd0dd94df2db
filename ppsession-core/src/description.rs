//! Session descriptions, content groups, and transport candidates.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Group semantics under which contents share one transport.
pub const GROUP_TYPE_BUNDLE: &str = "BUNDLE";

/// One named content (stream) being negotiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub name: String,
    /// Namespace of the content description, e.g. an audio or data type URI.
    pub content_type: String,
    #[serde(default)]
    pub rejected: bool,
}

impl ContentInfo {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            rejected: false,
        }
    }
}

/// A group of contents sharing some semantics (e.g. `BUNDLE`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentGroup {
    pub semantics: String,
    pub content_names: Vec<String>,
}

impl ContentGroup {
    pub fn new(semantics: impl Into<String>) -> Self {
        Self {
            semantics: semantics.into(),
            content_names: Vec::new(),
        }
    }

    /// Add a content name, ignoring duplicates.
    pub fn add_content_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.has_content_name(&name) {
            self.content_names.push(name);
        }
    }

    pub fn has_content_name(&self, name: &str) -> bool {
        self.content_names.iter().any(|n| n == name)
    }

    pub fn first_content_name(&self) -> Option<&str> {
        self.content_names.first().map(String::as_str)
    }
}

/// Ordered contents plus groups describing one side of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub contents: Vec<ContentInfo>,
    #[serde(default)]
    pub groups: Vec<ContentGroup>,
}

impl SessionDescription {
    pub fn new(contents: Vec<ContentInfo>, groups: Vec<ContentGroup>) -> Self {
        Self { contents, groups }
    }

    /// Builder-style helper for adding a content.
    pub fn with_content(mut self, content: ContentInfo) -> Self {
        self.contents.push(content);
        self
    }

    /// Builder-style helper for adding a group.
    pub fn with_group(mut self, group: ContentGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn get_content_by_name(&self, name: &str) -> Option<&ContentInfo> {
        self.contents.iter().find(|c| c.name == name)
    }

    pub fn first_content_by_type(&self, content_type: &str) -> Option<&ContentInfo> {
        self.contents.iter().find(|c| c.content_type == content_type)
    }

    pub fn get_group_by_name(&self, semantics: &str) -> Option<&ContentGroup> {
        self.groups.iter().find(|g| g.semantics == semantics)
    }

    pub fn has_group(&self, semantics: &str) -> bool {
        self.get_group_by_name(semantics).is_some()
    }
}

/// One discovered network endpoint usable by a transport channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Name of the channel this candidate belongs to (e.g. `rtp`).
    pub name: String,
    pub protocol: String,
    pub address: SocketAddr,
    pub priority: u32,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// `local`, `stun` or `relay`.
    pub candidate_type: String,
    #[serde(default)]
    pub generation: u32,
}

impl Candidate {
    /// A host candidate over UDP for the given channel.
    pub fn local_udp(name: impl Into<String>, address: SocketAddr, priority: u32) -> Self {
        Self {
            name: name.into(),
            protocol: "udp".to_string(),
            address,
            priority,
            username: String::new(),
            password: String::new(),
            candidate_type: "local".to_string(),
            generation: 0,
        }
    }
}

/// The candidates for one content over one transport type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub content_name: String,
    pub transport_type: String,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl TransportInfo {
    pub fn new(
        content_name: impl Into<String>,
        transport_type: impl Into<String>,
        candidates: Vec<Candidate>,
    ) -> Self {
        Self {
            content_name: content_name.into(),
            transport_type: transport_type.into(),
            candidates,
        }
    }
}
