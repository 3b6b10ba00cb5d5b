//! Broadcast engine
//!
//! ```text
//!  Relay::send() ──► BroadcastQueue ──► [bounded mpsc] ──► dispatcher
//!                    (blocks when full)                       │
//!                                               snapshot_clients()
//!                                                             │
//!                         ┌───────────────┬───────────────────┤
//!                         ▼               ▼                   ▼
//!                    deliver(bob)    deliver(carol)     (sender skipped)
//!                         │
//!                    on error: evict + close
//! ```
//!
//! The dispatcher only serializes dequeue order. Delivery tasks for one
//! message may still be running while the next message is dispatched; the
//! in-flight semaphore is the only thing that makes the dispatcher wait.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use super::config::BroadcastConfig;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::registry::{ClientId, Message, RelayState};
use crate::stats::RelayStats;

/// Producer side of the broadcast queue
#[derive(Clone)]
pub struct BroadcastQueue {
    tx: mpsc::Sender<Message>,
    stop: Arc<watch::Sender<bool>>,
    stats: Arc<RelayStats>,
}

/// A reserved slot on the broadcast queue
///
/// Sending through a slot never blocks, so it can be done while holding the
/// state lock.
pub struct QueueSlot<'a> {
    permit: mpsc::Permit<'a, Message>,
    stats: &'a RelayStats,
}

impl BroadcastQueue {
    /// Queue a message, waiting for space if the queue is full
    ///
    /// Returns false if the dispatcher has stopped.
    pub async fn enqueue(&self, message: Message) -> bool {
        match self.reserve().await {
            Some(slot) => {
                slot.send(message);
                true
            }
            None => false,
        }
    }

    /// Wait for a free slot on the queue
    ///
    /// Returns None if the dispatcher has stopped.
    pub async fn reserve(&self) -> Option<QueueSlot<'_>> {
        match self.tx.reserve().await {
            Ok(permit) => Some(QueueSlot {
                permit,
                stats: &self.stats,
            }),
            Err(_) => {
                tracing::warn!("Broadcast dispatcher stopped, dropping message");
                None
            }
        }
    }

    /// Ask the dispatcher to stop
    ///
    /// Messages already queued are still dispatched; later reservations fail.
    pub fn close(&self) {
        self.stop.send_replace(true);
    }
}

impl QueueSlot<'_> {
    pub fn send(self, message: Message) {
        self.permit.send(message);
        self.stats.record_enqueued();
    }
}

/// Single-consumer dispatcher that fans messages out to registered clients
pub struct BroadcastEngine<E> {
    rx: mpsc::Receiver<Message>,
    stop: watch::Receiver<bool>,
    state: Arc<RelayState<E>>,
    config: BroadcastConfig,
    stats: Arc<RelayStats>,
}

impl<E: Endpoint> BroadcastEngine<E> {
    /// Create the engine and the queue that feeds it
    ///
    /// The engine does nothing until [`run`](Self::run) or
    /// [`spawn`](Self::spawn) is called.
    pub fn new(
        state: Arc<RelayState<E>>,
        config: BroadcastConfig,
        stats: Arc<RelayStats>,
    ) -> (Self, BroadcastQueue) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (stop_tx, stop) = watch::channel(false);

        let queue = BroadcastQueue {
            tx,
            stop: Arc::new(stop_tx),
            stats: Arc::clone(&stats),
        };
        let engine = Self {
            rx,
            stop,
            state,
            config,
            stats,
        };

        (engine, queue)
    }

    /// Spawn the dispatch loop as a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Dispatch messages until the queue is closed or every handle dropped
    pub async fn run(mut self) {
        let in_flight = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut stopping = false;

        loop {
            let rx = &mut self.rx;
            let stop = &mut self.stop;
            let next = tokio::select! {
                message = rx.recv() => message,
                _ = async { let _ = stop.wait_for(|stopped| *stopped).await; }, if !stopping => {
                    // Refuse new messages, then drain what is already queued
                    rx.close();
                    stopping = true;
                    continue;
                }
            };
            let Some(message) = next else {
                break;
            };

            // Recipients are fixed at dequeue time
            let recipients = self.state.snapshot_clients().await;
            let message = Arc::new(message);
            let mut fanout = 0usize;

            for (id, endpoint) in recipients {
                if message.is_from(&id) {
                    continue;
                }

                let permit = match Arc::clone(&in_flight).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                fanout += 1;
                self.stats.record_attempt();
                tokio::spawn(deliver(
                    id,
                    endpoint,
                    Arc::clone(&message),
                    Arc::clone(&self.state),
                    Arc::clone(&self.stats),
                    self.config.delivery_timeout,
                    permit,
                ));
            }

            tracing::debug!(
                sender = %message.sender,
                recipients = fanout,
                "Broadcast dispatched"
            );
        }

        tracing::debug!("Broadcast queue closed, dispatcher stopping");
    }
}

async fn deliver<E: Endpoint>(
    id: ClientId,
    endpoint: Arc<E>,
    message: Arc<Message>,
    state: Arc<RelayState<E>>,
    stats: Arc<RelayStats>,
    timeout: Option<Duration>,
    _permit: OwnedSemaphorePermit,
) {
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, endpoint.deliver(&message))
            .await
            .unwrap_or_else(|_| Err(Error::Timeout)),
        None => endpoint.deliver(&message).await,
    };

    match result {
        Ok(()) => stats.record_success(),
        Err(e) => {
            stats.record_failure();
            tracing::warn!(
                client = %id,
                sender = %message.sender,
                error = %e,
                "Failed to deliver, removing client"
            );

            // Only the task that actually removes the entry closes it
            if let Some(removed) = state.evict(id.as_str(), &endpoint).await {
                stats.record_eviction();
                removed.close().await;
            }
        }
    }
}
