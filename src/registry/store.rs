//! Client registry and history log
//!
//! Both live behind one lock so that "mutate the registry" and "append the
//! history entry" happen in the same critical section.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use super::message::ClientId;

/// Registered endpoints plus the append-only history log
///
/// Not synchronized on its own; see [`RelayState`].
pub struct ClientRegistry<E> {
    clients: HashMap<ClientId, Arc<E>>,
    history: Vec<String>,
}

impl<E> ClientRegistry<E> {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// Insert or overwrite the endpoint for `id`
    ///
    /// Returns the endpoint that was displaced, which the caller must close.
    pub fn register(&mut self, id: ClientId, endpoint: Arc<E>) -> Option<Arc<E>> {
        self.clients.insert(id, endpoint)
    }

    /// Remove `id`, returning its endpoint for the caller to close
    pub fn unregister(&mut self, id: &str) -> Option<Arc<E>> {
        self.clients.remove(id)
    }

    /// Remove `id` only if it still maps to `endpoint`
    ///
    /// A failed delivery to an endpoint that has since been replaced by a new
    /// registration must not evict the replacement.
    pub fn evict(&mut self, id: &str, endpoint: &Arc<E>) -> Option<Arc<E>> {
        let same = self
            .clients
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, endpoint));
        if same {
            self.clients.remove(id)
        } else {
            None
        }
    }

    /// Copy of the registry, safe to iterate after the lock is released
    pub fn snapshot_clients(&self) -> HashMap<ClientId, Arc<E>> {
        self.clients.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Registered ids, sorted
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Append an entry to the history log
    pub fn append(&mut self, entry: String) {
        self.history.push(entry);
    }

    /// Append an entry and return a copy of the whole log including it
    pub fn append_and_snapshot(&mut self, entry: String) -> Vec<String> {
        self.history.push(entry);
        self.history.clone()
    }

    /// Copy of the history log
    pub fn snapshot_history(&self) -> Vec<String> {
        self.history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl<E> Default for ClientRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared relay state: the registry and history under a single lock
///
/// The lock is only ever held for in-memory work, never across network I/O.
pub struct RelayState<E> {
    inner: Mutex<ClientRegistry<E>>,
}

impl<E> RelayState<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ClientRegistry::new()),
        }
    }

    /// Lock the registry and history for a compound update
    pub async fn lock(&self) -> MutexGuard<'_, ClientRegistry<E>> {
        self.inner.lock().await
    }

    pub async fn snapshot_clients(&self) -> HashMap<ClientId, Arc<E>> {
        self.inner.lock().await.snapshot_clients()
    }

    pub async fn snapshot_history(&self) -> Vec<String> {
        self.inner.lock().await.snapshot_history()
    }

    pub async fn evict(&self, id: &str, endpoint: &Arc<E>) -> Option<Arc<E>> {
        self.inner.lock().await.evict(id, endpoint)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.lock().await.contains(id)
    }

    pub async fn client_ids(&self) -> Vec<ClientId> {
        self.inner.lock().await.client_ids()
    }

    pub async fn client_count(&self) -> usize {
        self.inner.lock().await.client_count()
    }
}

impl<E> Default for RelayState<E> {
    fn default() -> Self {
        Self::new()
    }
}
