//! Shutdown coordination
//!
//! The coordinator is the only task that removes clients. Pumps ask for a
//! removal over an unbounded queue; the coordinator performs it and, once
//! shutdown is raised, stops the acceptor and closes whatever is left.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::client::ClientId;
use super::listener::remove_socket_file;
use super::registry::ClientRegistry;
use super::signal::Signal;
use crate::stats::RelayStats;

/// Owner of client removal and final teardown
pub struct ShutdownCoordinator {
    registry: Arc<ClientRegistry>,
    removals: mpsc::UnboundedReceiver<ClientId>,
    shutdown: Signal,
    stats: Arc<RelayStats>,
}

impl ShutdownCoordinator {
    pub fn new(
        registry: Arc<ClientRegistry>,
        removals: mpsc::UnboundedReceiver<ClientId>,
        shutdown: Signal,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            registry,
            removals,
            shutdown,
            stats,
        }
    }

    /// Serve removal requests until shutdown, then tear down
    ///
    /// Teardown waits for the acceptor (which owns the listener), removes the
    /// socket file if one is given and closes every remaining client.
    pub async fn run(mut self, acceptor: JoinHandle<()>, socket_path: Option<PathBuf>) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                id = self.removals.recv() => match id {
                    Some(id) => self.remove(id).await,
                    // Every sender is gone: nothing can request removal anymore
                    None => shutdown.wait().await,
                },
            }
        }

        tracing::info!("Shutting down relay");

        if let Err(e) = acceptor.await {
            tracing::error!(error = %e, "Acceptor task failed");
        }

        if let Some(path) = socket_path {
            match remove_socket_file(&path) {
                Ok(true) => tracing::debug!(path = %path.display(), "Removed socket file"),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove socket file")
                }
            }
        }

        self.removals.close();
        while let Ok(id) = self.removals.try_recv() {
            self.remove(id).await;
        }

        let remaining = self.registry.close_all().await;
        if remaining > 0 {
            tracing::debug!(clients = remaining, "Closed remaining clients");
            self.stats.record_clients_removed(remaining as u64);
        }
    }

    async fn remove(&self, id: ClientId) {
        if self.registry.remove(id).await {
            self.stats.record_clients_removed(1);
            let clients = self.registry.len().await;
            tracing::info!(client_id = id, clients, "Client removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::relay::client::ClientHandle;

    struct Harness {
        registry: Arc<ClientRegistry>,
        removals: mpsc::UnboundedSender<ClientId>,
        shutdown: Signal,
        stats: Arc<RelayStats>,
        coordinator: ShutdownCoordinator,
    }

    fn harness() -> Harness {
        let registry = Arc::new(ClientRegistry::new());
        let (removals, removals_rx) = mpsc::unbounded_channel();
        let shutdown = Signal::new();
        let stats = Arc::new(RelayStats::new());
        let coordinator =
            ShutdownCoordinator::new(registry.clone(), removals_rx, shutdown.clone(), stats.clone());
        Harness {
            registry,
            removals,
            shutdown,
            stats,
            coordinator,
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_run_future_is_send() {
        let h = harness();
        let acceptor = tokio::spawn(async {});
        assert_send(&h.coordinator.run(acceptor, None));
    }

    #[tokio::test]
    async fn test_processes_removal_requests() {
        let h = harness();
        let (a, _rx_a) = ClientHandle::detached(1, 4);
        let (b, _rx_b) = ClientHandle::detached(2, 4);
        h.registry.add(a.clone()).await;
        h.registry.add(b.clone()).await;

        let acceptor = tokio::spawn(async {});
        let task = tokio::spawn(h.coordinator.run(acceptor, None));

        h.removals.send(1).unwrap();
        h.removals.send(1).unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while h.registry.contains(1).await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(a.is_closed());
        assert!(!b.is_closed());

        h.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert!(b.is_closed());
        assert!(h.registry.is_empty().await);
        assert_eq!(h.stats.snapshot().clients_removed, 2);
    }

    #[tokio::test]
    async fn test_waits_for_acceptor_and_removes_socket_file() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        std::fs::write(&path, b"").unwrap();

        let acceptor_shutdown = h.shutdown.clone();
        let acceptor = tokio::spawn(async move {
            acceptor_shutdown.wait().await;
        });

        let task = tokio::spawn(h.coordinator.run(acceptor, Some(path.clone())));
        h.shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!path.exists());
    }
}
