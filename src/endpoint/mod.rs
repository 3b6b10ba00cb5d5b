//! Callback endpoints
//!
//! The relay reaches each registered client through an [`Endpoint`] obtained
//! from a [`Connector`] at registration time. [`tcp`] provides the network
//! implementation; tests swap in an in-memory one.

use std::future::Future;

use crate::error::Result;
use crate::registry::Message;

pub mod tcp;

#[cfg(test)]
pub(crate) mod mock;

pub use tcp::{TcpConnector, TcpEndpoint};

/// A live handle to one client's callback
pub trait Endpoint: Send + Sync + 'static {
    /// Deliver a broadcast message. Any error gets the client evicted.
    fn deliver(&self, message: &Message) -> impl Future<Output = Result<()>> + Send;

    /// Release the handle. Called exactly once, after removal from the registry.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Establishes endpoints from callback addresses
pub trait Connector: Send + Sync + 'static {
    type Endpoint: Endpoint;

    /// Connect to `addr`. Failure aborts the registration.
    fn connect(&self, addr: &str) -> impl Future<Output = Result<Self::Endpoint>> + Send;
}
