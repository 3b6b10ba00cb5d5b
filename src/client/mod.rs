//! Client side of the relay
//!
//! Provides:
//! - [`RelayClient`] for calling the relay
//! - [`CallbackListener`] for receiving broadcasts pushed by the relay

pub mod callback;
pub mod config;
pub mod handle;

pub use callback::CallbackListener;
pub use config::ClientConfig;
pub use handle::RelayClient;
