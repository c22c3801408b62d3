//! Local socket listener
//!
//! Accepts client connections on the unix socket and hands each one to the
//! registry.

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;

use super::client::{Client, ClientContext, ClientId};
use super::registry::ClientRegistry;
use super::signal::Signal;
use crate::error::{Error, Result};
use crate::stats::RelayStats;

/// Accept loop for local clients
pub struct Acceptor {
    listener: UnixListener,
    registry: Arc<ClientRegistry>,
    context: ClientContext,
    queue_capacity: usize,
    shutdown: Signal,
    stats: Arc<RelayStats>,
    next_client_id: AtomicU64,
}

impl Acceptor {
    pub fn new(
        listener: UnixListener,
        registry: Arc<ClientRegistry>,
        context: ClientContext,
        queue_capacity: usize,
        shutdown: Signal,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            listener,
            registry,
            context,
            queue_capacity,
            shutdown,
            stats,
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Accept until shutdown or an accept error
    ///
    /// An accept error raises shutdown. The listener is closed when this
    /// returns.
    pub async fn run(self) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        self.register(stream).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept client");
                        self.shutdown.trigger();
                        break;
                    }
                },
            }
        }

        tracing::debug!("Acceptor stopped");
    }

    /// Register a connection and start its pumps
    pub async fn register<S>(&self, stream: S) -> ClientId
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (client, handle) = Client::new(id, stream, self.queue_capacity);

        if !self.registry.add(handle).await {
            tracing::warn!(client_id = id, "Client rejected by registry");
            return id;
        }

        self.stats.record_client_accepted();
        tracing::info!(client_id = id, "Client connected");

        tokio::spawn(client.run(self.context.clone()));
        id
    }
}

/// Clear the way for binding `path`
///
/// Only a socket nobody is listening on is removed. A regular file, a
/// directory or a socket with a live listener behind it is left alone and
/// reported as an error.
pub(crate) fn clear_stale_socket(path: &Path) -> Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    if !metadata.file_type().is_socket() {
        return Err(Error::Config(format!(
            "{} exists and is not a socket",
            path.display()
        )));
    }

    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => Err(Error::Config(format!(
            "{} is in use by another process",
            path.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            Ok(remove_socket_file(path)?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove a socket file, treating a missing file as success
pub(crate) fn remove_socket_file(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;
    use tokio::sync::mpsc;

    use super::*;
    use crate::filter::FilterKind;

    struct Harness {
        acceptor: Acceptor,
        registry: Arc<ClientRegistry>,
        shutdown: Signal,
        outbound_rx: mpsc::Receiver<Bytes>,
        _removals_rx: mpsc::UnboundedReceiver<ClientId>,
        _dir: tempfile::TempDir,
        path: std::path::PathBuf,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let (outbound, outbound_rx) = mpsc::channel(8);
        let (removals, removals_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(ClientRegistry::new());
        let shutdown = Signal::new();
        let context = ClientContext {
            filter: FilterKind::Raw,
            max_token_size: 1024,
            outbound,
            removals,
        };
        let acceptor = Acceptor::new(
            listener,
            registry.clone(),
            context,
            4,
            shutdown.clone(),
            Arc::new(RelayStats::new()),
        );

        Harness {
            acceptor,
            registry,
            shutdown,
            outbound_rx,
            _removals_rx: removals_rx,
            _dir: dir,
            path,
        }
    }

    #[tokio::test]
    async fn test_accepts_and_registers_clients() {
        let mut h = harness();
        let registry = h.registry.clone();
        let task = tokio::spawn(h.acceptor.run());

        let mut a = UnixStream::connect(&h.path).await.unwrap();
        let _b = UnixStream::connect(&h.path).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while registry.len().await < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(registry.ids().await.len(), 2);

        a.write_all(b"PRIVMSG #a :hi\n").await.unwrap();
        assert_eq!(
            h.outbound_rx.recv().await.unwrap(),
            Bytes::from_static(b"PRIVMSG #a :hi\n")
        );

        h.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_assigns_unique_ids() {
        let h = harness();
        let (a, _peer_a) = tokio::io::duplex(64);
        let (b, _peer_b) = tokio::io::duplex(64);

        let id_a = h.acceptor.register(a).await;
        let id_b = h.acceptor.register(b).await;

        assert_ne!(id_a, id_b);
        assert!(h.registry.contains(id_a).await);
        assert!(h.registry.contains(id_b).await);
    }

    #[test]
    fn test_clear_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        assert!(!clear_stale_socket(&path).unwrap());

        // A dropped listener leaves its socket file behind
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        assert!(clear_stale_socket(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_clear_stale_socket_keeps_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"important user data").unwrap();

        assert!(matches!(clear_stale_socket(&path), Err(Error::Config(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"important user data");
    }

    #[test]
    fn test_clear_stale_socket_keeps_live_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        let _live = std::os::unix::net::UnixListener::bind(&path).unwrap();

        assert!(matches!(clear_stale_socket(&path), Err(Error::Config(_))));
        assert!(path.exists());
        std::os::unix::net::UnixStream::connect(&path).unwrap();
    }

    #[test]
    fn test_remove_socket_file_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        assert!(!remove_socket_file(&path).unwrap());

        std::fs::write(&path, b"").unwrap();
        assert!(remove_socket_file(&path).unwrap());
        assert!(!path.exists());
    }
}
