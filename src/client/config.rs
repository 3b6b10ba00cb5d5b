//! Client configuration

use std::time::Duration;

use crate::protocol::constants::{
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_RELAY_ADDR,
};

/// Default number of received messages buffered before the callback stalls
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Client configuration options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay address (host:port)
    pub relay_addr: String,

    /// Largest `Receive` frame the callback listener accepts
    pub max_frame_size: usize,

    /// Largest relay response accepted; history replies grow without bound
    pub max_response_size: usize,

    /// Timeout for connecting to the relay
    pub connect_timeout: Duration,

    /// Buffered messages between the callback listener and its consumer
    pub inbox_capacity: usize,
}

impl ClientConfig {
    /// Create a config for the relay at `relay_addr`
    pub fn new(relay_addr: impl Into<String>) -> Self {
        Self {
            relay_addr: relay_addr.into(),
            ..Default::default()
        }
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set maximum relay response size
    pub fn max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Set the inbox capacity (at least 1)
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_addr: DEFAULT_RELAY_ADDR.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            connect_timeout: Duration::from_secs(10),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}
