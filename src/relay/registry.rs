//! Client registry
//!
//! The set of live clients is guarded by a single async mutex: `add`,
//! `remove` and the snapshot taken by `broadcast` never run concurrently, so
//! no caller observes a client half-removed.
//!
//! Broadcast copies the handles out under the lock and delivers after
//! releasing it. A stalled delivery therefore never blocks `remove`, and a
//! client removed mid-broadcast is skipped as soon as its close signal fires.

use bytes::Bytes;
use tokio::sync::Mutex;

use super::client::{ClientHandle, ClientId, Delivery};
use super::config::SlowClientPolicy;

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Clients whose queue accepted the message
    pub delivered: usize,
    /// Clients that missed the message because their queue was full
    pub dropped: usize,
    /// Clients that stayed full past the policy timeout
    pub stalled: Vec<ClientId>,
}

/// Registry of connected clients
pub struct ClientRegistry {
    clients: Mutex<Vec<ClientHandle>>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
        }
    }

    /// Register a client
    ///
    /// Returns `false` (and leaves the registry unchanged) if a client with
    /// the same id is already present or the handle is already closed.
    pub async fn add(&self, handle: ClientHandle) -> bool {
        let mut clients = self.clients.lock().await;

        if handle.is_closed() || clients.iter().any(|c| c.id() == handle.id()) {
            return false;
        }

        tracing::debug!(client_id = handle.id(), clients = clients.len() + 1, "Client registered");
        clients.push(handle);
        true
    }

    /// Remove a client and close it
    ///
    /// Closing wakes both of the client's pumps: the writer stops draining
    /// its queue and the reader abandons its pending read, which releases the
    /// connection. Removing an absent client is a no-op returning `false`.
    pub async fn remove(&self, id: ClientId) -> bool {
        let mut clients = self.clients.lock().await;

        let Some(index) = clients.iter().position(|c| c.id() == id) else {
            return false;
        };

        // Delivery order across clients carries no meaning
        let handle = clients.swap_remove(index);
        handle.close();
        true
    }

    /// Remove and close every client
    pub async fn close_all(&self) -> usize {
        let mut clients = self.clients.lock().await;
        let count = clients.len();
        for handle in clients.drain(..) {
            handle.close();
        }
        count
    }

    /// Copy of the current handles
    pub async fn snapshot(&self) -> Vec<ClientHandle> {
        self.clients.lock().await.clone()
    }

    /// Deliver one message to every registered client, in registry order
    pub async fn broadcast(&self, msg: &Bytes, policy: SlowClientPolicy) -> DeliveryReport {
        let clients = self.snapshot().await;
        let mut report = DeliveryReport::default();

        for client in &clients {
            match client.deliver(msg.clone(), policy).await {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Dropped => {
                    tracing::warn!(client_id = client.id(), "Client queue full, message dropped");
                    report.dropped += 1;
                }
                Delivery::Stalled => report.stalled.push(client.id()),
                Delivery::Closed => {}
            }
        }

        report
    }

    /// Check whether a client is registered
    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.lock().await.iter().any(|c| c.id() == id)
    }

    /// Ids of registered clients
    pub async fn ids(&self) -> Vec<ClientId> {
        self.clients.lock().await.iter().map(|c| c.id()).collect()
    }

    /// Number of registered clients
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Whether no clients are registered
    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
