//! Per-connection request loop
//!
//! Reads one request frame at a time, runs it against the relay and writes
//! the response. Decode errors inside a well-formed frame are answered with
//! an `Error` response; framing errors end the connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::endpoint::Connector;
use crate::error::Result;
use crate::protocol::{Framed, Request, Response};
use crate::relay::Relay;

pub(crate) struct Connection<C: Connector, S> {
    id: u64,
    peer_addr: SocketAddr,
    framed: Framed<S>,
    relay: Arc<Relay<C>>,
}

impl<C, S> Connection<C, S>
where
    C: Connector,
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(
        id: u64,
        stream: S,
        peer_addr: SocketAddr,
        max_frame_size: usize,
        relay: Arc<Relay<C>>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            framed: Framed::new(stream, max_frame_size),
            relay,
        }
    }

    /// Serve requests until the peer hangs up
    pub(crate) async fn run(&mut self) -> Result<()> {
        while let Some(payload) = self.framed.read_frame().await? {
            let response = match Request::decode(payload) {
                Ok(request) => {
                    tracing::debug!(
                        connection_id = self.id,
                        peer = %self.peer_addr,
                        request = request.name(),
                        "Request"
                    );
                    self.dispatch(request).await
                }
                Err(e) => {
                    tracing::debug!(connection_id = self.id, error = %e, "Bad request");
                    Response::Error(e.to_string())
                }
            };

            self.framed.write_response(&response).await?;
        }

        Ok(())
    }

    async fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::Register { id, callback_addr } => {
                match self.relay.register(&id, &callback_addr).await {
                    Ok(()) => Response::Ok,
                    Err(e) => Response::Error(e.to_string()),
                }
            }
            Request::Unregister { id, .. } => {
                self.relay.unregister(&id).await;
                Response::Ok
            }
            Request::Send(message) => {
                Response::History(self.relay.send(&message.sender, &message.text).await)
            }
            Request::History => Response::History(self.relay.history().await),
            Request::Receive(_) => Response::Error("relay does not accept Receive".into()),
        }
    }
}
