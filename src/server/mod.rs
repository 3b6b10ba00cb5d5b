//! Relay server
//!
//! Accepts client connections and serves Register, Unregister, Send and
//! History requests against a shared [`Relay`](crate::relay::Relay).

pub mod config;
mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::RelayServer;
