//! Relay entry point
//!
//! Wires the listener, the upstream session and the coordinator together.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use super::client::ClientContext;
use super::config::RelayConfig;
use super::coordinator::ShutdownCoordinator;
use super::listener::{clear_stale_socket, remove_socket_file, Acceptor};
use super::registry::ClientRegistry;
use super::signal::Signal;
use super::upstream::{self, UpstreamContext, UpstreamRelay};
use crate::error::Result;
use crate::stats::RelayStats;

/// Unix-socket multiplexer for one upstream connection
pub struct Relay {
    config: RelayConfig,
    registry: Arc<ClientRegistry>,
    shutdown: Signal,
    stats: Arc<RelayStats>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ClientRegistry::new()),
            shutdown: Signal::new(),
            stats: Arc::new(RelayStats::new()),
        }
    }

    /// Get a reference to the client registry
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Handle that stops the relay when triggered
    pub fn shutdown_handle(&self) -> Signal {
        self.shutdown.clone()
    }

    /// Bind the local socket
    ///
    /// A socket file left behind by a previous run is replaced. Anything
    /// else at the path, including a socket that is still being served,
    /// makes binding fail without touching it.
    pub fn bind(&self) -> Result<UnixListener> {
        let path = &self.config.socket_path;
        if clear_stale_socket(path)? {
            tracing::debug!(path = %path.display(), "Removed stale socket file");
        }

        let listener = UnixListener::bind(path)?;
        tracing::info!(path = %path.display(), "Listening for clients");
        Ok(listener)
    }

    /// Run the relay
    ///
    /// Binds the socket, optionally waits for a first client, dials upstream
    /// and relays until shutdown. Returns an error only for startup failures;
    /// losing upstream after startup is an orderly shutdown.
    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;
        let listener = self.bind()?;
        let path = self.config.socket_path.clone();

        let first = if self.config.wait_for_first_client {
            tracing::info!("Waiting for first client");
            let accepted = tokio::select! {
                _ = self.shutdown.wait() => None,
                accepted = listener.accept() => Some(accepted),
            };

            match accepted {
                Some(Ok((stream, _))) => Some(stream),
                Some(Err(e)) => {
                    drop(listener);
                    discard_socket_file(&path);
                    return Err(e.into());
                }
                None => {
                    drop(listener);
                    discard_socket_file(&path);
                    return Ok(());
                }
            }
        } else {
            None
        };

        let connected = tokio::select! {
            _ = self.shutdown.wait() => None,
            connected = upstream::connect(
                &self.config.upstream_host,
                self.config.upstream_port,
                self.config.tls,
                self.config.connect_timeout,
            ) => Some(connected),
        };

        let upstream = match connected {
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                tracing::error!(
                    host = %self.config.upstream_host,
                    port = self.config.upstream_port,
                    error = %e,
                    "Failed to connect to upstream"
                );
                drop(listener);
                discard_socket_file(&path);
                return Err(e);
            }
            None => {
                drop(listener);
                discard_socket_file(&path);
                return Ok(());
            }
        };

        self.serve(listener, upstream, first).await
    }

    /// Relay between an already bound listener and an established upstream
    pub async fn run_with_upstream<S>(&self, listener: UnixListener, upstream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.serve(listener, upstream, None).await
    }

    async fn serve<S>(
        &self,
        listener: UnixListener,
        upstream: S,
        first: Option<UnixStream>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let socket_path = listener
            .local_addr()
            .ok()
            .and_then(|addr| addr.as_pathname().map(Path::to_path_buf));

        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue_capacity);
        let (removals_tx, removals_rx) = mpsc::unbounded_channel();

        let context = ClientContext {
            filter: self.config.send_filter,
            max_token_size: self.config.max_token_size,
            outbound: outbound_tx,
            removals: removals_tx.clone(),
        };
        let acceptor = Acceptor::new(
            listener,
            Arc::clone(&self.registry),
            context,
            self.config.client_queue_capacity,
            self.shutdown.clone(),
            Arc::clone(&self.stats),
        );

        if let Some(stream) = first {
            acceptor.register(stream).await;
        }

        let upstream_ctx = UpstreamContext {
            recv_filter: self.config.recv_filter,
            max_token_size: self.config.max_token_size,
            policy: self.config.slow_client_policy,
            registry: Arc::clone(&self.registry),
            removals: removals_tx,
            shutdown: self.shutdown.clone(),
            stats: Arc::clone(&self.stats),
        };

        tracing::info!(
            recv_filter = %self.config.recv_filter,
            send_filter = %self.config.send_filter,
            "Relay started"
        );

        let upstream_task = tokio::spawn(UpstreamRelay::new(upstream).run(outbound_rx, upstream_ctx));
        let acceptor_task = tokio::spawn(acceptor.run());

        ShutdownCoordinator::new(
            Arc::clone(&self.registry),
            removals_rx,
            self.shutdown.clone(),
            Arc::clone(&self.stats),
        )
        .run(acceptor_task, socket_path)
        .await;

        if let Err(e) = upstream_task.await {
            tracing::error!(error = %e, "Upstream task failed");
        }

        let stats = self.stats.snapshot();
        tracing::info!(
            uptime_secs = stats.uptime.as_secs(),
            clients_accepted = stats.clients_accepted,
            messages_from_upstream = stats.messages_from_upstream,
            messages_to_upstream = stats.messages_to_upstream,
            dropped_deliveries = stats.dropped_deliveries,
            "Relay stopped"
        );

        Ok(())
    }
}

fn discard_socket_file(path: &Path) {
    if let Err(e) = remove_socket_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove socket file");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());

        let relay = Relay::new(RelayConfig::default().socket_path(&path));
        let _listener = relay.bind().unwrap();

        UnixStream::connect(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_refuses_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        std::fs::write(&path, b"important user data").unwrap();

        let relay = Relay::new(RelayConfig::default().socket_path(&path));
        assert!(matches!(relay.bind(), Err(Error::Config(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"important user data");
    }

    #[tokio::test]
    async fn test_bind_refuses_live_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        let config = RelayConfig::default().socket_path(&path);

        let first = Relay::new(config.clone());
        let live = first.bind().unwrap();

        let second = Relay::new(config);
        assert!(second.bind().is_err());

        // The first relay keeps its socket
        let _client = UnixStream::connect(&path).await.unwrap();
        assert!(live.accept().await.is_ok());
    }

    #[tokio::test]
    async fn test_run_leaves_foreign_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        std::fs::write(&path, b"keep").unwrap();

        let relay = Relay::new(RelayConfig::default().socket_path(&path));
        assert!(relay.run().await.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_run_futures_are_send() {
        let relay = Relay::new(RelayConfig::default());
        assert_send(&relay.run());
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let relay = Relay::new(RelayConfig::default().client_queue_capacity(0));
        assert!(matches!(relay.run().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_run_with_upstream_relays_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        let relay = Arc::new(Relay::new(RelayConfig::default().socket_path(&path)));
        let listener = relay.bind().unwrap();

        let (local, mut server) = duplex(1024);
        let task = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.run_with_upstream(listener, local).await })
        };

        let mut client = UnixStream::connect(&path).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while relay.registry().is_empty().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        server.write_all(b"PING\n").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING\n");

        client.write_all(b"PONG\n").await.unwrap();
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PONG\n");

        relay.shutdown_handle().trigger();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(!path.exists());
    }
}
