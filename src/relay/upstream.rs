//! Upstream connection
//!
//! One TCP (optionally TLS) session shared by every local client. The reader
//! pump filters upstream bytes and broadcasts each token through the
//! registry; the writer pump drains the shared outbound queue. Either pump
//! ending takes the whole relay down.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::client::{write_message, ClientId};
use super::config::SlowClientPolicy;
use super::registry::ClientRegistry;
use super::signal::{Signal, SignalListener};
use crate::error::{Error, Result};
use crate::filter::{FilterKind, Scanner};
use crate::stats::RelayStats;
use crate::tls::{insecure_connector, server_name};

const SHUTDOWN_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Plain or TLS upstream socket
pub enum UpstreamStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for UpstreamStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            UpstreamStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for UpstreamStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            UpstreamStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_flush(cx),
            UpstreamStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            UpstreamStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Dial the upstream server
///
/// The TCP connect and the TLS handshake each get `timeout`. With `tls` set
/// the host doubles as the server name sent in the handshake; certificates
/// are not verified.
pub async fn connect(host: &str, port: u16, tls: bool, timeout: Duration) -> Result<UpstreamStream> {
    let tcp = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| Error::ConnectTimeout(timeout))??;

    if let Err(e) = tcp.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY on upstream");
    }

    if !tls {
        tracing::info!(host, port, "Connected to upstream");
        return Ok(UpstreamStream::Plain(tcp));
    }

    let name = server_name(host)?;
    let connector = insecure_connector()?;
    let stream = tokio::time::timeout(timeout, connector.connect(name, tcp))
        .await
        .map_err(|_| Error::ConnectTimeout(timeout))??;

    tracing::info!(host, port, "Connected to upstream (TLS)");
    Ok(UpstreamStream::Tls(Box::new(stream)))
}

/// Shared state the upstream pumps need
#[derive(Clone)]
pub struct UpstreamContext {
    pub recv_filter: FilterKind,
    pub max_token_size: usize,
    pub policy: SlowClientPolicy,
    pub registry: Arc<ClientRegistry>,
    pub removals: mpsc::UnboundedSender<ClientId>,
    pub shutdown: Signal,
    pub stats: Arc<RelayStats>,
}

/// Both directions of the upstream session
pub struct UpstreamRelay<S> {
    stream: S,
}

impl<S> UpstreamRelay<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Run until upstream closes, a pump fails, or shutdown is raised
    ///
    /// Raises shutdown on the way out in every case.
    pub async fn run(self, outbound: mpsc::Receiver<Bytes>, ctx: UpstreamContext) {
        let (read_half, write_half) = tokio::io::split(self.stream);
        let scanner = Scanner::new(read_half, ctx.recv_filter.build(ctx.max_token_size));

        let reader = tokio::spawn(read_pump(scanner, ctx.clone(), ctx.shutdown.subscribe()));
        write_pump(write_half, outbound, &ctx, ctx.shutdown.subscribe()).await;

        let _ = reader.await;
        tracing::debug!("Upstream pumps stopped");
    }
}

/// Upstream → every client
async fn read_pump<R>(mut scanner: Scanner<R>, ctx: UpstreamContext, mut shutdown: SignalListener)
where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            more = scanner.scan() => {
                if !more {
                    match scanner.err() {
                        Some(e) => tracing::error!(error = %e, "Upstream read failed"),
                        None => tracing::info!("Upstream closed the connection"),
                    }
                    break;
                }
            }
        }

        let msg = scanner.token();
        tracing::debug!(
            direction = ">>",
            filter = scanner.filter_name(),
            message = %scanner.text().trim_end(),
            "Upstream message"
        );

        let report = tokio::select! {
            _ = shutdown.wait() => break,
            report = ctx.registry.broadcast(&msg, ctx.policy) => report,
        };
        ctx.stats.record_broadcast(&report);

        for id in report.stalled {
            tracing::warn!(client_id = id, "Client too slow, disconnecting");
            if ctx.removals.send(id).is_err() {
                ctx.registry.remove(id).await;
            }
        }
    }

    ctx.shutdown.trigger();
}

/// Shared outbound queue → upstream
async fn write_pump<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Bytes>,
    ctx: &UpstreamContext,
    mut shutdown: SignalListener,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = shutdown.wait() => break,
            msg = outbound.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = shutdown.wait() => break,
            written = write_message(&mut writer, &msg) => written,
        };

        match written {
            Ok(()) => ctx.stats.record_to_upstream(),
            Err(e) => {
                tracing::error!(error = %e, "Upstream write failed");
                break;
            }
        }
    }

    ctx.shutdown.trigger();
    outbound.close();
    let _ = tokio::time::timeout(SHUTDOWN_WRITE_TIMEOUT, writer.shutdown()).await;
}
