//! Callback listener
//!
//! The relay dials this listener after registration and pushes `Receive`
//! calls over that connection. Each received message is forwarded to the
//! inbox channel handed out by [`CallbackListener::bind`].

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::Result;
use crate::protocol::{Framed, Request, Response};
use crate::registry::Message;

use super::config::ClientConfig;

/// Accepts relay connections and serves `Receive`
pub struct CallbackListener {
    listener: TcpListener,
    inbox: mpsc::Sender<Message>,
    max_frame_size: usize,
}

impl CallbackListener {
    /// Bind the callback address
    ///
    /// Returns the listener and the receiving end of its inbox. If the inbox
    /// receiver is dropped, deliveries are answered with an error and the
    /// relay evicts this client.
    pub async fn bind(
        addr: &str,
        config: &ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<Message>)> {
        let listener = TcpListener::bind(addr).await?;
        let (tx, rx) = mpsc::channel(config.inbox_capacity.max(1));

        let callback = Self {
            listener,
            inbox: tx,
            max_frame_size: config.max_frame_size,
        };

        Ok((callback, rx))
    }

    /// Address to register with the relay
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve in the background
    ///
    /// Aborting the returned handle also drops every open relay connection.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Accept relay connections forever
    pub async fn run(self) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        tracing::debug!(peer = %peer_addr, "Relay connected to callback");
                        connections.spawn(serve_relay(
                            socket,
                            self.inbox.clone(),
                            self.max_frame_size,
                        ));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept relay connection");
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Ok(Err(e)) = finished {
                        tracing::debug!(error = %e, "Relay connection ended");
                    }
                }
            }
        }
    }
}

async fn serve_relay(
    socket: TcpStream,
    inbox: mpsc::Sender<Message>,
    max_frame_size: usize,
) -> Result<()> {
    let mut framed = Framed::new(socket, max_frame_size);

    while let Some(payload) = framed.read_frame().await? {
        let response = match Request::decode(payload) {
            Ok(Request::Receive(message)) => match inbox.send(message).await {
                Ok(()) => Response::Ok,
                Err(_) => Response::Error("client is no longer reading".into()),
            },
            Ok(other) => Response::Error(format!("callback does not serve {}", other.name())),
            Err(e) => Response::Error(e.to_string()),
        };

        framed.write_response(&response).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn dial(listener: &CallbackListener, config: &ClientConfig) -> Framed<TcpStream> {
        let stream = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        Framed::new(stream, config.max_frame_size)
    }

    #[tokio::test]
    async fn test_receive_forwards_to_inbox() {
        let config = ClientConfig::default();
        let (listener, mut inbox) = CallbackListener::bind("127.0.0.1:0", &config).await.unwrap();
        let mut relay_side = dial(&listener, &config).await;
        let _task = listener.spawn();

        let reply = relay_side
            .call(&Request::Receive(Message::new("Bob", "User Bob joined")))
            .await
            .unwrap();

        assert_eq!(reply, Response::Ok);
        assert_eq!(
            inbox.recv().await,
            Some(Message::new("Bob", "User Bob joined"))
        );
    }

    #[tokio::test]
    async fn test_dropped_inbox_rejects() {
        let config = ClientConfig::default();
        let (listener, inbox) = CallbackListener::bind("127.0.0.1:0", &config).await.unwrap();
        let mut relay_side = dial(&listener, &config).await;
        let _task = listener.spawn();
        drop(inbox);

        let reply = relay_side
            .call(&Request::Receive(Message::new("Alice", "hi")))
            .await
            .unwrap();
        assert!(matches!(reply, Response::Error(_)));
    }

    #[tokio::test]
    async fn test_rejects_relay_calls() {
        let config = ClientConfig::default();
        let (listener, _inbox) = CallbackListener::bind("127.0.0.1:0", &config).await.unwrap();
        let mut relay_side = dial(&listener, &config).await;
        let _task = listener.spawn();

        let reply = relay_side.call(&Request::History).await.unwrap();
        assert_eq!(
            reply,
            Response::Error("callback does not serve history".into())
        );
    }

    #[tokio::test]
    async fn test_abort_closes_connections() {
        let config = ClientConfig::default();
        let (listener, _inbox) = CallbackListener::bind("127.0.0.1:0", &config).await.unwrap();
        let mut relay_side = dial(&listener, &config).await;
        let task = listener.spawn();

        // Let the listener accept before tearing it down
        relay_side
            .call(&Request::Receive(Message::new("a", "b")))
            .await
            .unwrap();
        task.abort();
        let _ = task.await;

        let result = relay_side
            .call(&Request::Receive(Message::new("a", "c")))
            .await;
        assert!(result.is_err());
    }
}
