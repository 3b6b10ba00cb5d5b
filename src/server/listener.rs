//! Relay server listener
//!
//! Handles the TCP accept loop and spawns a request loop per connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::endpoint::{Connector, TcpConnector};
use crate::error::Result;
use crate::relay::Relay;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;

/// Relay server
pub struct RelayServer<C: Connector = TcpConnector> {
    config: ServerConfig,
    relay: Arc<Relay<C>>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer<TcpConnector> {
    /// Create a server that dials client callbacks over TCP
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let connector = TcpConnector::new(config.connect_timeout)
            .max_frame_size(config.max_frame_size)
            .tcp_nodelay(config.tcp_nodelay);
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> RelayServer<C> {
    /// Create a server with a custom connector
    pub fn with_connector(config: ServerConfig, connector: C) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let relay = Arc::new(Relay::with_config(connector, config.broadcast.clone()));

        Self {
            config,
            relay,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the relay
    pub fn relay(&self) -> &Arc<Relay<C>> {
        &self.relay
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve from `listener` until `shutdown` completes, then shut the relay
    /// down so registered callbacks are closed
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            result = self.serve(listener) => result?,
        }

        self.relay.shutdown().await;
        Ok(())
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(addr = %listener.local_addr()?, "Relay server listening");

        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit; the permit lives as long as the connection task
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            connection_id = connection_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let relay = Arc::clone(&self.relay);
        let max_frame_size = self.config.max_frame_size;

        tokio::spawn(async move {
            let _permit = permit;
            let mut connection =
                Connection::new(connection_id, socket, peer_addr, max_frame_size, relay);

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    connection_id = connection_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(connection_id = connection_id, "Connection closed");
        });
    }
}
