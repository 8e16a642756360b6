//! Client configuration
//!
//! One flat configuration struct covers the connection target, reconnect
//! timing, framing limits and the handshake identity.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{HyperCubeError, Result};

// ----------------------------------------------------------------------------
// Defaults
// ----------------------------------------------------------------------------

/// Fixed port the HyperCube server listens on
pub const DEFAULT_SERVER_PORT: u16 = 5054;

/// Interval between connection attempts and idle connectivity checks
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(10_000);

/// Grace period after a disconnect before the next connection attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1_000);

/// Maximum accepted payload length for one frame
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// Largest single raw read issued by the receive activity
pub const DEFAULT_READ_CHUNK_LEN: usize = 64 * 1024;

// ----------------------------------------------------------------------------
// Client Configuration
// ----------------------------------------------------------------------------

/// Configuration for a HyperCube client connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server TCP port
    pub server_port: u16,
    /// Interval between connection attempts and heartbeat re-checks
    pub reconnect_interval: Duration,
    /// Wait after a disconnect before reconnecting
    pub reconnect_delay: Duration,
    /// Upper bound on a single connect call
    pub connect_timeout: Duration,
    /// Maximum payload length accepted or produced
    pub max_payload_len: usize,
    /// Maximum bytes requested by one raw read
    pub read_chunk_len: usize,
    /// Name announced in the `connectionInfo` handshake
    pub connection_name: String,
    /// Group created during the handshake
    pub group_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: Duration::from_secs(5),
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            read_chunk_len: DEFAULT_READ_CHUNK_LEN,
            connection_name: "hypercube-client".to_string(),
            group_name: "hypercube".to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timings suitable for tests against local stub servers
    pub fn testing() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(300),
            reconnect_delay: Duration::from_millis(100),
            connect_timeout: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Set server port
    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    /// Set reconnect interval
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set post-disconnect grace period
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set maximum payload length
    pub fn with_max_payload_len(mut self, len: usize) -> Self {
        self.max_payload_len = len;
        self
    }

    /// Set connection name announced in the handshake
    pub fn with_connection_name<S: Into<String>>(mut self, name: S) -> Self {
        self.connection_name = name.into();
        self
    }

    /// Set group name created in the handshake
    pub fn with_group_name<S: Into<String>>(mut self, name: S) -> Self {
        self.group_name = name.into();
        self
    }

    /// Check that every field is usable
    pub fn validate(&self) -> Result<()> {
        if self.server_port == 0 {
            return Err(HyperCubeError::config_error("server_port must be non-zero"));
        }
        if self.reconnect_interval.is_zero() {
            return Err(HyperCubeError::config_error(
                "reconnect_interval must be non-zero",
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(HyperCubeError::config_error("connect_timeout must be non-zero"));
        }
        if self.max_payload_len == 0 || self.max_payload_len > u32::MAX as usize {
            return Err(HyperCubeError::config_error(format!(
                "max_payload_len must be in 1..={}",
                u32::MAX
            )));
        }
        if self.read_chunk_len == 0 {
            return Err(HyperCubeError::config_error("read_chunk_len must be non-zero"));
        }
        if self.connection_name.trim().is_empty() {
            return Err(HyperCubeError::config_error("connection_name must not be empty"));
        }
        if self.group_name.trim().is_empty() {
            return Err(HyperCubeError::config_error("group_name must not be empty"));
        }
        Ok(())
    }
}
