//! Broadcast engine configuration

use std::time::Duration;

/// Default number of messages that may wait for the dispatcher
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default cap on concurrently running delivery tasks
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Broadcast engine configuration options
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Pending messages before producers block
    pub queue_capacity: usize,

    /// Delivery tasks allowed to run at once (across all messages)
    pub max_in_flight: usize,

    /// Give up on a delivery after this long (None = wait forever)
    pub delivery_timeout: Option<Duration>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            delivery_timeout: None,
        }
    }
}

impl BroadcastConfig {
    /// Set queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the in-flight delivery cap (at least 1)
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    /// Fail deliveries that take longer than `timeout`
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = Some(timeout);
        self
    }
}
