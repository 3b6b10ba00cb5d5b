//! Client registry and history log
//!
//! The registry maps client ids to their callback endpoints; the history log
//! records every join, leave and chat line in append order.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<RelayState<E>>
//!                  ┌─────────────────────────────┐
//!                  │ Mutex<ClientRegistry {      │
//!                  │   clients: HashMap<Id,      │
//!                  │            Arc<Endpoint>>,  │
//!                  │   history: Vec<String>,     │
//!                  │ }>                          │
//!                  └──────────────┬──────────────┘
//!                                 │
//!          ┌──────────────────────┼──────────────────────┐
//!          │                      │                      │
//!          ▼                      ▼                      ▼
//!   Relay::register()      Relay::send()       BroadcastEngine
//!   insert + "joined"      append + snapshot   snapshot_clients()
//!                                              evict() on failure
//! ```
//!
//! Endpoints are shared as `Arc` so a snapshot can be iterated without the
//! lock. Whoever removes an entry from the map owns closing its endpoint.

pub mod message;
pub mod store;

pub use message::{join_entry, leave_entry, ClientId, Message};
pub use store::{ClientRegistry, RelayState};
