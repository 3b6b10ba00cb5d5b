//! Relay facade: Register, Unregister, Send and History
//!
//! Each state-changing call follows the same shape:
//!
//! 1. Do any network work (dialing the callback) without holding the lock.
//! 2. Reserve a broadcast queue slot. This is where backpressure blocks.
//! 3. Under the state lock: mutate the registry, append the history entry and
//!    push the broadcast message through the reserved slot.
//! 4. Close any endpoint that was removed, after the lock is released.
//!
//! Pushing the message inside the critical section makes broadcast dequeue
//! order identical to history order.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::broadcast::{BroadcastConfig, BroadcastEngine, BroadcastQueue};
use crate::endpoint::{Connector, Endpoint};
use crate::error::{Error, Result};
use crate::registry::{join_entry, leave_entry, ClientId, Message, RelayState};
use crate::stats::{RelayStats, StatsSnapshot};

/// The chat relay
///
/// Owns the registry, the history log and the broadcast engine. Create one
/// per process and share it behind an `Arc`.
pub struct Relay<C: Connector> {
    connector: C,
    state: Arc<RelayState<C::Endpoint>>,
    queue: BroadcastQueue,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<RelayStats>,
}

impl<C: Connector> Relay<C> {
    /// Create a relay with the default broadcast configuration
    ///
    /// Must be called from within a Tokio runtime; the dispatcher is spawned
    /// immediately.
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, BroadcastConfig::default())
    }

    /// Create a relay with a custom broadcast configuration
    pub fn with_config(connector: C, config: BroadcastConfig) -> Self {
        let state = Arc::new(RelayState::new());
        let stats = Arc::new(RelayStats::new());
        let (engine, queue) = BroadcastEngine::new(Arc::clone(&state), config, Arc::clone(&stats));

        Self {
            connector,
            state,
            queue,
            dispatcher: Mutex::new(Some(engine.spawn())),
            stats,
        }
    }

    /// Register `id` with a callback at `addr`
    ///
    /// Dials `addr` first; if that fails nothing is changed and the error is
    /// returned. Re-registering an existing id replaces (and closes) its old
    /// endpoint. Everyone else receives a join notice.
    pub async fn register(&self, id: &str, addr: &str) -> Result<()> {
        let id = ClientId::new(id);

        let endpoint = match self.connector.connect(addr).await {
            Ok(endpoint) => Arc::new(endpoint),
            Err(e) => {
                tracing::warn!(client = %id, addr = addr, error = %e, "Registration failed");
                return Err(Error::Registration {
                    id: id.to_string(),
                    addr: addr.to_string(),
                    source: Box::new(e),
                });
            }
        };

        let entry = join_entry(&id);
        let slot = self.queue.reserve().await;
        let displaced = {
            let mut state = self.state.lock().await;
            let displaced = state.register(id.clone(), endpoint);
            state.append(entry.clone());
            if let Some(slot) = slot {
                slot.send(Message::new(id.as_str(), entry));
            }
            displaced
        };

        if let Some(old) = displaced {
            tracing::debug!(client = %id, "Replacing previous registration");
            old.close().await;
        }

        tracing::info!(client = %id, addr = addr, "Client registered");
        Ok(())
    }

    /// Remove `id` and tell everyone else it left
    ///
    /// Appends the leave entry even if `id` was not registered.
    pub async fn unregister(&self, id: &str) {
        let id = ClientId::new(id);
        let entry = leave_entry(&id);

        let slot = self.queue.reserve().await;
        let removed = {
            let mut state = self.state.lock().await;
            let removed = state.unregister(id.as_str());
            state.append(entry.clone());
            if let Some(slot) = slot {
                slot.send(Message::new(id.as_str(), entry));
            }
            removed
        };

        match removed {
            Some(endpoint) => {
                endpoint.close().await;
                tracing::info!(client = %id, "Client unregistered");
            }
            None => tracing::debug!(client = %id, "Unregister for unknown client"),
        }
    }

    /// Post a message from `sender`
    ///
    /// Returns the full history including this message. Delivery to the
    /// other clients happens in the background.
    pub async fn send(&self, sender: &str, text: &str) -> Vec<String> {
        let message = Message::new(sender, text);
        let entry = message.history_entry();

        let slot = self.queue.reserve().await;
        let mut state = self.state.lock().await;
        let history = state.append_and_snapshot(entry);
        if let Some(slot) = slot {
            slot.send(message);
        }
        history
    }

    /// Snapshot of the full history
    pub async fn history(&self) -> Vec<String> {
        self.state.snapshot_history().await
    }

    pub async fn is_registered(&self, id: &str) -> bool {
        self.state.contains(id).await
    }

    /// Currently registered ids, sorted
    pub async fn client_ids(&self) -> Vec<ClientId> {
        self.state.client_ids().await
    }

    pub async fn client_count(&self) -> usize {
        self.state.client_count().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting broadcasts, let the dispatcher drain the queue, then
    /// close every remaining endpoint
    ///
    /// Deliveries already started may still be running when this returns.
    /// Later calls still update the registry and history but broadcast
    /// nothing. Calling it again only closes endpoints registered since.
    pub async fn shutdown(&self) {
        self.queue.close();
        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            if let Err(e) = dispatcher.await {
                tracing::error!(error = %e, "Broadcast dispatcher panicked");
            }
        }

        let endpoints = {
            let mut state = self.state.lock().await;
            let mut endpoints = Vec::new();
            for id in state.client_ids() {
                endpoints.extend(state.unregister(id.as_str()));
            }
            endpoints
        };
        for endpoint in endpoints {
            endpoint.close().await;
        }

        tracing::info!("Relay shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::task::Poll;
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;
    use tokio_test::assert_pending;

    use super::*;
    use crate::endpoint::mock::MockConnector;

    async fn recv(rx: &mut UnboundedReceiver<Message>) -> Message {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("callback channel closed")
    }

    /// Wait until the dispatcher has finished every delivery it started
    async fn settle(relay: &Relay<MockConnector>) {
        timeout(Duration::from_secs(1), async {
            loop {
                let s = relay.stats();
                if s.deliveries_attempted == s.deliveries_succeeded + s.deliveries_failed {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    let again = relay.stats();
                    if again == s {
                        return;
                    }
                } else {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            }
        })
        .await
        .expect("deliveries did not settle");
    }

    #[tokio::test]
    async fn test_first_register_history() {
        let connector = MockConnector::new();
        let _a = connector.listen("addrA");
        let relay = Relay::new(connector);

        relay.register("Alice", "addrA").await.unwrap();

        assert_eq!(relay.history().await, vec!["User Alice joined"]);
        assert!(relay.is_registered("Alice").await);
    }

    #[tokio::test]
    async fn test_join_notice_reaches_others_only() {
        let connector = MockConnector::new();
        let mut alice = connector.listen("addrA");
        let mut bob = connector.listen("addrB");
        let relay = Relay::new(connector);

        relay.register("Alice", "addrA").await.unwrap();
        relay.register("Bob", "addrB").await.unwrap();

        assert_eq!(recv(&mut alice).await, Message::new("Bob", "User Bob joined"));
        assert_eq!(
            relay.history().await,
            vec!["User Alice joined", "User Bob joined"]
        );

        settle(&relay).await;
        assert!(bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_returns_history_and_skips_sender() {
        let connector = MockConnector::new();
        let mut alice = connector.listen("addrA");
        let mut bob = connector.listen("addrB");
        let relay = Relay::new(connector);

        relay.register("Alice", "addrA").await.unwrap();
        relay.register("Bob", "addrB").await.unwrap();
        recv(&mut alice).await; // Bob's join notice

        let history = relay.send("Alice", "hi").await;
        assert_eq!(
            history,
            vec!["User Alice joined", "User Bob joined", "Alice: hi"]
        );
        assert_eq!(recv(&mut bob).await, Message::new("Alice", "hi"));

        settle(&relay).await;
        assert!(alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_client_is_evicted() {
        let connector = MockConnector::new();
        let _alice = connector.listen("addrA");
        let bob = connector.listen("addrB");
        let relay = Relay::new(connector);

        relay.register("Alice", "addrA").await.unwrap();
        relay.register("Bob", "addrB").await.unwrap();
        drop(bob);

        relay.send("Alice", "ping").await;
        settle(&relay).await;
        assert!(!relay.is_registered("Bob").await);
        assert_eq!(relay.stats().clients_evicted, 1);

        // Later sends neither fail nor try Bob again
        let attempted = relay.stats().deliveries_attempted;
        let history = relay.send("Alice", "anyone?").await;
        settle(&relay).await;
        assert_eq!(history.last().unwrap(), "Alice: anyone?");
        assert_eq!(relay.stats().deliveries_attempted, attempted);
    }

    #[tokio::test]
    async fn test_unregister_appends_leave_and_stops_delivery() {
        let connector = MockConnector::new();
        let mut alice = connector.listen("addrA");
        let mut bob = connector.listen("addrB");
        let relay = Relay::new(connector);

        relay.register("Alice", "addrA").await.unwrap();
        relay.register("Bob", "addrB").await.unwrap();
        recv(&mut alice).await;

        relay.unregister("Alice").await;
        assert_eq!(relay.history().await.last().unwrap(), "User Alice left");
        assert_eq!(recv(&mut bob).await, Message::new("Alice", "User Alice left"));

        relay.send("Bob", "still there?").await;
        settle(&relay).await;
        // Alice's channel is closed or empty: nothing more was delivered
        assert!(alice.try_recv().is_err());
        assert_eq!(relay.client_ids().await, vec![ClientId::new("Bob")]);
    }

    #[tokio::test]
    async fn test_unregister_unknown_still_logs() {
        let relay = Relay::new(MockConnector::new());

        relay.unregister("Ghost").await;

        assert_eq!(relay.history().await, vec!["User Ghost left"]);
    }

    #[tokio::test]
    async fn test_failed_register_changes_nothing() {
        let relay = Relay::new(MockConnector::new());

        let result = relay.register("Alice", "nowhere").await;

        assert!(matches!(result, Err(Error::Registration { ref id, .. }) if id == "Alice"));
        assert!(relay.history().await.is_empty());
        assert_eq!(relay.client_count().await, 0);
        assert_eq!(relay.stats().messages_enqueued, 0);
    }

    #[tokio::test]
    async fn test_reregister_overwrites_and_closes_old() {
        let connector = MockConnector::new();
        let mut first = connector.listen("addr1");
        let mut second = connector.listen("addr2");
        let _carol = connector.listen("addrC");
        let relay = Relay::new(connector);

        relay.register("Bob", "addr1").await.unwrap();
        relay.register("Bob", "addr2").await.unwrap();
        relay.register("Carol", "addrC").await.unwrap();

        assert_eq!(relay.client_count().await, 2);
        assert_eq!(recv(&mut second).await, Message::new("Carol", "User Carol joined"));
        settle(&relay).await;
        assert!(first.try_recv().is_err());
        assert_eq!(
            relay.history().await,
            vec!["User Bob joined", "User Bob joined", "User Carol joined"]
        );
    }

    #[tokio::test]
    async fn test_snapshots_do_not_change() {
        let connector = MockConnector::new();
        let _a = connector.listen("addrA");
        let relay = Relay::new(connector);

        relay.register("Alice", "addrA").await.unwrap();
        let sent = relay.send("Alice", "one").await;
        let before = relay.history().await;

        relay.send("Alice", "two").await;
        relay.unregister("Alice").await;

        assert_eq!(sent, vec!["User Alice joined", "Alice: one"]);
        assert_eq!(before, sent);
        assert_eq!(relay.history().await.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_keep_history_order() {
        let connector = MockConnector::new();
        let mut bob = connector.listen("addrB");
        let relay = Arc::new(Relay::with_config(
            connector,
            BroadcastConfig::default().max_in_flight(1),
        ));
        relay.register("Bob", "addrB").await.unwrap();

        let mut tasks = Vec::new();
        for writer in 0..4 {
            let relay = Arc::clone(&relay);
            tasks.push(tokio::spawn(async move {
                let mut lengths = Vec::new();
                for n in 0..25 {
                    let history = relay.send(&format!("w{}", writer), &n.to_string()).await;
                    lengths.push(history.len());
                }
                lengths
            }));
        }
        for task in tasks {
            let lengths = task.await.unwrap();
            // Each writer sees the log grow
            assert!(lengths.windows(2).all(|w| w[0] < w[1]));
        }

        let history = relay.history().await;
        assert_eq!(history.len(), 101);

        // Bob saw the messages in exactly history order
        for expected in &history[1..] {
            assert_eq!(&recv(&mut bob).await.history_entry(), expected);
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_endpoints() {
        let connector = MockConnector::new();
        let _a = connector.listen("addrA");
        let relay = Relay::new(connector.clone());
        relay.register("Alice", "addrA").await.unwrap();

        let alice = Arc::clone(&relay.state.snapshot_clients().await["Alice"]);
        relay.shutdown().await;

        assert!(alice.closed.load(Ordering::SeqCst));
        assert_eq!(relay.client_count().await, 0);

        // Still answers, but nothing is queued any more
        let history = relay.send("Alice", "anyone?").await;
        assert_eq!(history.last().unwrap(), "Alice: anyone?");
        assert_eq!(relay.stats().messages_enqueued, 1);

        relay.shutdown().await;
        assert_eq!(alice.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_blocks_while_queue_full() {
        let connector = MockConnector::new();
        let (mut bob, gate) = connector.listen_gated("addrB");
        let _alice = connector.listen("addrA");
        let config = BroadcastConfig::default().queue_capacity(1).max_in_flight(1);
        let relay = Relay::with_config(connector, config);

        relay.register("Bob", "addrB").await.unwrap();
        // Alice's join notice to Bob holds the only delivery slot
        relay.register("Alice", "addrA").await.unwrap();
        // m1 is dequeued and waits for a delivery slot, m2 fills the queue
        relay.send("Alice", "m1").await;
        relay.send("Alice", "m2").await;

        let mut blocked = tokio_test::task::spawn(relay.send("Alice", "m3"));
        assert_pending!(blocked.poll());
        assert_eq!(relay.history().await.len(), 4);

        gate.add_permits(8);
        let history = timeout(Duration::from_secs(1), async {
            loop {
                if let Poll::Ready(history) = blocked.poll() {
                    return history;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("send stayed blocked after the queue drained");

        assert_eq!(history.last().unwrap(), "Alice: m3");
        assert_eq!(history.len(), 5);

        assert_eq!(recv(&mut bob).await.text, "User Alice joined");
        for i in 1..=3 {
            assert_eq!(recv(&mut bob).await.text, format!("m{}", i));
        }
    }
}
