//! Relay client
//!
//! Issues Register, Unregister, Send and History calls over one TCP
//! connection. Calls are sequential; `&mut self` enforces one in flight.

use tokio::net::TcpStream;

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{Framed, Request, Response};
use crate::registry::Message;

use super::config::ClientConfig;

/// Connection to a relay
///
/// # Example
/// ```no_run
/// use chat_relay::client::{CallbackListener, ClientConfig, RelayClient};
///
/// # async fn example() -> chat_relay::Result<()> {
/// let config = ClientConfig::new("127.0.0.1:1234");
/// let (listener, mut inbox) = CallbackListener::bind("127.0.0.1:0", &config).await?;
/// let callback_addr = listener.local_addr()?.to_string();
/// let _callbacks = listener.spawn();
///
/// let mut client = RelayClient::connect(config).await?;
/// client.register("alice", &callback_addr).await?;
/// let history = client.send("alice", "hello").await?;
/// println!("{:?}", history);
///
/// while let Some(msg) = inbox.recv().await {
///     println!("{}", msg.text);
/// }
/// # Ok(())
/// # }
/// ```
pub struct RelayClient {
    framed: Framed<TcpStream>,
    relay_addr: String,
}

impl RelayClient {
    /// Connect to the relay named in `config`
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(config.relay_addr.as_str()),
        )
        .await??;
        stream.set_nodelay(true)?;

        tracing::debug!(relay = %config.relay_addr, "Connected to relay");

        Ok(Self {
            framed: Framed::new(stream, config.max_response_size),
            relay_addr: config.relay_addr,
        })
    }

    /// Relay address this client is connected to
    pub fn relay_addr(&self) -> &str {
        &self.relay_addr
    }

    /// Register `id`; the relay will dial `callback_addr` for deliveries
    pub async fn register(&mut self, id: &str, callback_addr: &str) -> Result<()> {
        let request = Request::Register {
            id: id.to_string(),
            callback_addr: callback_addr.to_string(),
        };
        self.call_expecting_ok(&request).await
    }

    /// Remove `id` from the relay
    pub async fn unregister(&mut self, id: &str, callback_addr: &str) -> Result<()> {
        let request = Request::Unregister {
            id: id.to_string(),
            callback_addr: callback_addr.to_string(),
        };
        self.call_expecting_ok(&request).await
    }

    /// Post a message; returns the relay's full history including it
    pub async fn send(&mut self, sender: &str, text: &str) -> Result<Vec<String>> {
        let request = Request::Send(Message::new(sender, text));
        self.call_expecting_history(&request).await
    }

    /// Fetch the relay's full history
    pub async fn history(&mut self) -> Result<Vec<String>> {
        self.call_expecting_history(&Request::History).await
    }

    async fn call(&mut self, request: &Request) -> Result<Response> {
        match self.framed.call(request).await? {
            Response::Error(reason) => Err(Error::Rejected(reason)),
            response => Ok(response),
        }
    }

    async fn call_expecting_ok(&mut self, request: &Request) -> Result<()> {
        match self.call(request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(request, &other)),
        }
    }

    async fn call_expecting_history(&mut self, request: &Request) -> Result<Vec<String>> {
        match self.call(request).await? {
            Response::History(messages) => Ok(messages),
            other => Err(unexpected(request, &other)),
        }
    }
}

fn unexpected(request: &Request, response: &Response) -> Error {
    ProtocolError::UnexpectedMessage(format!(
        "{} answered with {:?}",
        request.name(),
        response
    ))
    .into()
}
