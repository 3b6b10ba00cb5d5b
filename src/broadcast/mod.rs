//! Asynchronous fan-out of relayed messages
//!
//! A bounded queue feeds a single dispatcher. Producers block when the queue
//! is full, which throttles every state-changing relay call.

pub mod config;
pub mod engine;

pub use config::BroadcastConfig;
pub use engine::{BroadcastEngine, BroadcastQueue, QueueSlot};
