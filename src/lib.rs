//! Chat relay
//!
//! A central relay that clients register a callback with, post text messages
//! to, and read the accumulated history from. Every message is fanned out to
//! all other registered clients in the background; clients that can no longer
//! be reached are evicted on the next failed delivery.
//!
//! # Layout
//!
//! - [`registry`]: client registry and append-only history log behind one lock
//! - [`broadcast`]: bounded queue, single dispatcher, bounded delivery tasks
//! - [`relay`]: the Register / Unregister / Send / History facade
//! - [`endpoint`]: how the relay reaches a client's callback
//! - [`protocol`]: length-prefixed binary wire format
//! - [`server`]: TCP accept loop in front of a [`Relay`]
//! - [`client`]: relay client and callback listener
//!
//! # Example
//! ```no_run
//! use chat_relay::{RelayServer, ServerConfig};
//!
//! # async fn example() -> chat_relay::Result<()> {
//! let server = RelayServer::new(ServerConfig::default());
//! server.run().await
//! # }
//! ```

pub mod broadcast;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod stats;

pub use broadcast::BroadcastConfig;
pub use client::{CallbackListener, ClientConfig, RelayClient};
pub use error::{Error, Result};
pub use registry::{ClientId, Message};
pub use relay::Relay;
pub use server::{RelayServer, ServerConfig};
