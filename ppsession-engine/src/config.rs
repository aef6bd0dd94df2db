//! Engine configuration for ppsession.

use std::time::Duration;

use ppsession_core::DEFAULT_TRANSPORT_TYPE;

/// Session and driver configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Our own address, used as `from` on outgoing stanzas.
    pub local_name: String,
    /// The only transport type sessions accept in offers.
    pub transport_type: String,
    /// How long a transport with channels may stay unwritable.
    pub writable_timeout: Duration,
    /// Capacity of the driver's command channel.
    pub command_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_name: "ppsession@localhost".to_string(),
            transport_type: DEFAULT_TRANSPORT_TYPE.to_string(),
            writable_timeout: Duration::from_secs(10),
            command_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Create a config for the given local address.
    pub fn with_local_name(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            ..Default::default()
        }
    }

    /// Set the transport type.
    pub fn with_transport_type(mut self, transport_type: impl Into<String>) -> Self {
        self.transport_type = transport_type.into();
        self
    }

    /// Set the writability watchdog delay.
    pub fn with_writable_timeout(mut self, timeout: Duration) -> Self {
        self.writable_timeout = timeout;
        self
    }

    /// Set the driver command channel capacity.
    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.writable_timeout, Duration::from_secs(10));
        assert_eq!(config.transport_type, DEFAULT_TRANSPORT_TYPE);
    }

    #[test]
    fn custom_config() {
        let config = SessionConfig::with_local_name("alice@example.net")
            .with_transport_type("urn:test:transport")
            .with_writable_timeout(Duration::from_millis(50))
            .with_command_capacity(0);

        assert_eq!(config.local_name, "alice@example.net");
        assert_eq!(config.transport_type, "urn:test:transport");
        assert_eq!(config.writable_timeout, Duration::from_millis(50));
        assert_eq!(config.command_capacity, 1);
    }
}
