//! Configuration types for the SSDB client

use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

/// Default capacity of the connection event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or IP address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Idle time after which a `Timeout` notification is raised.
    /// `None` disables it. A timeout never closes the connection.
    pub timeout: Option<Duration>,
    /// Disable Nagle's algorithm on the socket
    pub nodelay: bool,
    /// Enable SO_KEEPALIVE on the socket
    pub keepalive: bool,
    /// How many connection events a slow subscriber may lag behind
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: None,
            nodelay: true,
            keepalive: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Configuration for the given server, defaults elsewhere.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the idle timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Enable or disable TCP keep-alive probes
    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Set the event channel capacity (at least 1)
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Returns the server address as `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
