//! In-memory endpoints for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Semaphore};

use super::{Connector, Endpoint};
use crate::error::{Error, Result};
use crate::registry::Message;

#[derive(Clone)]
struct Route {
    tx: mpsc::UnboundedSender<Message>,
    gate: Option<Arc<Semaphore>>,
}

/// Connector that resolves addresses against routes registered with `listen`
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    routes: Arc<Mutex<HashMap<String, Route>>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Accept connections on `addr`; delivered messages arrive on the receiver.
    /// Dropping the receiver makes every later delivery fail.
    pub(crate) fn listen(&self, addr: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .lock()
            .unwrap()
            .insert(addr.to_string(), Route { tx, gate: None });
        rx
    }

    /// Like `listen`, but each delivery first waits for a permit on the gate
    pub(crate) fn listen_gated(
        &self,
        addr: &str,
    ) -> (mpsc::UnboundedReceiver<Message>, Arc<Semaphore>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(0));
        self.routes.lock().unwrap().insert(
            addr.to_string(),
            Route {
                tx,
                gate: Some(Arc::clone(&gate)),
            },
        );
        (rx, gate)
    }
}

impl Connector for MockConnector {
    type Endpoint = MockEndpoint;

    async fn connect(&self, addr: &str) -> Result<MockEndpoint> {
        let route = self
            .routes
            .lock()
            .unwrap()
            .get(addr)
            .cloned()
            .ok_or(Error::ConnectionClosed)?;

        Ok(MockEndpoint {
            route,
            closed: Arc::new(AtomicBool::new(false)),
            close_calls: Arc::new(AtomicUsize::new(0)),
        })
    }
}

pub(crate) struct MockEndpoint {
    route: Route,
    pub(crate) closed: Arc<AtomicBool>,
    pub(crate) close_calls: Arc<AtomicUsize>,
}

impl Endpoint for MockEndpoint {
    async fn deliver(&self, message: &Message) -> Result<()> {
        if let Some(gate) = &self.route.gate {
            gate.acquire().await.map_err(|_| Error::ConnectionClosed)?.forget();
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        self.route
            .tx
            .send(message.clone())
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}
