//! Relay wire protocol
//!
//! Every call is one request frame answered by one response frame on the same
//! connection. Clients call the relay with Register/Unregister/Send/History;
//! the relay calls each client's callback address with Receive.

pub mod constants;
pub mod framed;
pub mod message;

pub use framed::Framed;
pub use message::{Request, Response};
