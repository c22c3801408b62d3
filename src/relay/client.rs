//! Local clients and their pumps
//!
//! Each client runs two pumps over its split connection:
//!
//! ```text
//!  socket ──read──► Scanner(send filter) ──► shared outbound queue ──► upstream
//!  socket ◄─write── inbound queue ◄── registry broadcast ◄── upstream
//! ```
//!
//! Whichever pump stops first asks the coordinator to remove the client.
//! Removal raises the client's close signal, which stops the other pump; the
//! connection is released once both halves are dropped.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::config::SlowClientPolicy;
use super::signal::{Signal, SignalListener};
use crate::filter::{FilterKind, Scanner};

/// Unique client identifier
pub type ClientId = u64;

/// Result of handing one message to a client's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued
    Delivered,
    /// Queue full, message skipped
    Dropped,
    /// Queue stayed full past the timeout
    Stalled,
    /// Client is gone
    Closed,
}

/// Registry-side handle to a client
///
/// Cheap to clone. Holds the sending end of the client's inbound queue and
/// its close signal, but not the connection itself.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    inbound: mpsc::Sender<Bytes>,
    closed: Signal,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Raise the close signal; returns `true` the first time only
    pub fn close(&self) -> bool {
        self.closed.trigger()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }

    /// Queue a message according to `policy`
    pub async fn deliver(&self, msg: Bytes, policy: SlowClientPolicy) -> Delivery {
        if self.is_closed() {
            return Delivery::Closed;
        }

        let msg = match self.inbound.try_send(msg) {
            Ok(()) => return Delivery::Delivered,
            Err(mpsc::error::TrySendError::Closed(_)) => return Delivery::Closed,
            Err(mpsc::error::TrySendError::Full(msg)) => msg,
        };

        match policy {
            SlowClientPolicy::Drop => Delivery::Dropped,
            SlowClientPolicy::Block => self.send_until_closed(msg).await,
            SlowClientPolicy::Disconnect(timeout) => {
                match tokio::time::timeout(timeout, self.send_until_closed(msg)).await {
                    Ok(delivery) => delivery,
                    Err(_) => Delivery::Stalled,
                }
            }
        }
    }

    async fn send_until_closed(&self, msg: Bytes) -> Delivery {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            _ = closed.wait() => Delivery::Closed,
            sent = self.inbound.send(msg) => match sent {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Closed,
            },
        }
    }

    /// Handle with no connection behind it, for exercising the registry
    #[cfg(test)]
    pub(crate) fn detached(id: ClientId, capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            id,
            inbound: tx,
            closed: Signal::new(),
        };
        (handle, rx)
    }
}

/// Everything a client's pumps share with the rest of the relay
#[derive(Clone)]
pub struct ClientContext {
    /// Filter applied to bytes read from the client
    pub filter: FilterKind,
    /// Largest token the filter buffers
    pub max_token_size: usize,
    /// Shared queue toward upstream
    pub outbound: mpsc::Sender<Bytes>,
    /// Removal requests for the coordinator
    pub removals: mpsc::UnboundedSender<ClientId>,
}

/// A local connection and its private inbound queue
pub struct Client<S> {
    id: ClientId,
    stream: S,
    inbound: mpsc::Receiver<Bytes>,
    closed: Signal,
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a connection; the handle goes to the registry
    pub fn new(id: ClientId, stream: S, queue_capacity: usize) -> (Self, ClientHandle) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let closed = Signal::new();

        let handle = ClientHandle {
            id,
            inbound: tx,
            closed: closed.clone(),
        };
        let client = Self {
            id,
            stream,
            inbound: rx,
            closed,
        };

        (client, handle)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Run both pumps until the client is removed
    pub async fn run(self, ctx: ClientContext) {
        let Client {
            id,
            stream,
            inbound,
            closed,
        } = self;

        let (read_half, write_half) = tokio::io::split(stream);
        let scanner = Scanner::new(read_half, ctx.filter.build(ctx.max_token_size));

        let mut reader = tokio::spawn(read_pump(
            id,
            scanner,
            ctx.outbound.clone(),
            closed.subscribe(),
        ));
        let writer = write_pump(id, write_half, inbound, closed.subscribe());
        tokio::pin!(writer);

        let reader_done = tokio::select! {
            _ = &mut reader => true,
            _ = &mut writer => false,
        };

        if ctx.removals.send(id).is_err() {
            // Coordinator already gone (relay shutting down): close locally
            closed.trigger();
        }

        if reader_done {
            writer.await;
        } else {
            let _ = reader.await;
        }

        tracing::debug!(client_id = id, "Client pumps stopped");
    }
}

/// Client → shared outbound queue
async fn read_pump<R>(
    id: ClientId,
    mut scanner: Scanner<R>,
    outbound: mpsc::Sender<Bytes>,
    mut closed: SignalListener,
) where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = closed.wait() => break,
            more = scanner.scan() => {
                if !more {
                    match scanner.err() {
                        Some(e) => tracing::error!(client_id = id, error = %e, "Client read failed"),
                        None => tracing::info!(client_id = id, "Client disconnected"),
                    }
                    break;
                }
            }
        }

        let msg = scanner.token();
        tracing::debug!(
            client_id = id,
            direction = "<<",
            filter = scanner.filter_name(),
            message = %scanner.text().trim_end(),
            "Client message"
        );

        tokio::select! {
            _ = closed.wait() => break,
            sent = outbound.send(msg) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

/// Private inbound queue → client socket
async fn write_pump<W>(
    id: ClientId,
    mut writer: W,
    mut inbound: mpsc::Receiver<Bytes>,
    mut closed: SignalListener,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = closed.wait() => break,
            msg = inbound.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = closed.wait() => break,
            written = write_message(&mut writer, &msg) => written,
        };

        if let Err(e) = written {
            tracing::error!(client_id = id, error = %e, "Client write failed");
            break;
        }
    }

    inbound.close();
    let _ = writer.shutdown().await;
}

pub(crate) async fn write_message<W>(writer: &mut W, msg: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(msg).await?;
    writer.flush().await
}
