//! Counters for relay activity

use std::sync::atomic::{AtomicU64, Ordering};

/// Relay-wide counters, updated lock-free from the facade and delivery tasks
#[derive(Debug, Default)]
pub struct RelayStats {
    messages_enqueued: AtomicU64,
    deliveries_attempted: AtomicU64,
    deliveries_succeeded: AtomicU64,
    deliveries_failed: AtomicU64,
    clients_evicted: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Messages placed on the broadcast queue
    pub messages_enqueued: u64,
    /// Delivery tasks started
    pub deliveries_attempted: u64,
    /// Deliveries acknowledged by the recipient
    pub deliveries_succeeded: u64,
    /// Deliveries that failed or timed out
    pub deliveries_failed: u64,
    /// Clients removed after a failed delivery
    pub clients_evicted: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.messages_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self) {
        self.deliveries_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.deliveries_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.clients_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Deliveries started but not yet finished
    pub fn in_flight(&self) -> u64 {
        let s = self.snapshot();
        s.deliveries_attempted
            .saturating_sub(s.deliveries_succeeded + s.deliveries_failed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_enqueued: self.messages_enqueued.load(Ordering::Relaxed),
            deliveries_attempted: self.deliveries_attempted.load(Ordering::Relaxed),
            deliveries_succeeded: self.deliveries_succeeded.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            clients_evicted: self.clients_evicted.load(Ordering::Relaxed),
        }
    }
}
