//! TCP callback endpoints
//!
//! The relay dials the address a client registered with and keeps that
//! connection for the lifetime of the registration. Each delivery is a
//! `Receive` request answered by `Ok`.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

use super::{Connector, Endpoint};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::constants::DEFAULT_MAX_FRAME_SIZE;
use crate::protocol::{Framed, Request, Response};
use crate::registry::Message;

/// Dials client callback addresses over TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    max_frame_size: usize,
    tcp_nodelay: bool,
}

impl TcpConnector {
    /// Create a connector with the given dial timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            tcp_nodelay: true,
        }
    }

    /// Set the maximum frame size accepted from clients
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Enable or disable TCP_NODELAY on outbound connections
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Connector for TcpConnector {
    type Endpoint = TcpEndpoint;

    async fn connect(&self, addr: &str) -> Result<TcpEndpoint> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await??;
        if self.tcp_nodelay {
            stream.set_nodelay(true)?;
        }

        tracing::debug!(addr = addr, "Connected to callback");

        Ok(TcpEndpoint {
            addr: addr.to_string(),
            conn: Mutex::new(Some(Framed::new(stream, self.max_frame_size))),
            closed: watch::Sender::new(false),
        })
    }
}

/// Outbound connection to one client's callback listener
///
/// Deliveries to the same client are serialized on the connection so each
/// request is paired with its own response. Closing cancels any delivery
/// still waiting on the peer.
pub struct TcpEndpoint {
    addr: String,
    conn: Mutex<Option<Framed<TcpStream>>>,
    closed: watch::Sender<bool>,
}

impl TcpEndpoint {
    /// Callback address this endpoint is connected to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Returns true until the endpoint is closed or a delivery broke it
    pub fn is_open(&self) -> bool {
        !*self.closed.borrow()
    }

    async fn round_trip(&self, message: &Message) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let framed = conn.as_mut().ok_or(Error::ConnectionClosed)?;

        let result = match framed.call(&Request::Receive(message.clone())).await {
            Ok(Response::Ok) => Ok(()),
            Ok(Response::Error(reason)) => Err(Error::Rejected(reason)),
            Ok(other) => Err(ProtocolError::UnexpectedMessage(format!(
                "expected Ok to Receive, got {:?}",
                other
            ))
            .into()),
            Err(e) => Err(e),
        };

        // The stream may be out of step with the peer after a failure
        if result.is_err() {
            conn.take();
            self.closed.send_replace(true);
        }
        result
    }
}

impl Endpoint for TcpEndpoint {
    async fn deliver(&self, message: &Message) -> Result<()> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(Error::ConnectionClosed);
        }

        tokio::select! {
            result = self.round_trip(message) => result,
            _ = async { let _ = closed.wait_for(|done| *done).await; } => {
                tracing::debug!(addr = %self.addr, "Delivery cancelled by close");
                Err(Error::ConnectionClosed)
            }
        }
    }

    async fn close(&self) {
        // Wakes pending deliveries so they drop the connection lock
        self.closed.send_replace(true);

        if let Some(mut framed) = self.conn.lock().await.take() {
            let _ = framed.shutdown().await;
            tracing::debug!(addr = %self.addr, "Callback connection closed");
        }
    }
}
