//! One-shot signals
//!
//! A [`Signal`] is raised at most once and observed by any number of
//! listeners. The relay uses one for process-wide shutdown and one per
//! client to tell both of its pumps that the client has been removed.

use std::sync::Arc;

use tokio::sync::watch;

/// One-shot event shared between tasks
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    /// Create an untriggered signal
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal
    ///
    /// Returns `true` only for the call that actually raised it.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|raised| {
            if *raised {
                false
            } else {
                *raised = true;
                true
            }
        })
    }

    /// Whether the signal has been raised
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create a listener
    pub fn subscribe(&self) -> SignalListener {
        SignalListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Wait until the signal is raised
    pub async fn wait(&self) {
        self.subscribe().wait().await
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`Signal`]
#[derive(Debug)]
pub struct SignalListener {
    rx: watch::Receiver<bool>,
}

impl SignalListener {
    /// Wait until the signal is raised
    ///
    /// Returns immediately if it already was. Cancel-safe.
    pub async fn wait(&mut self) {
        // The sender lives as long as any Signal clone; if it is gone nobody
        // can raise it anymore, which is treated the same as raised.
        let _ = self.rx.wait_for(|raised| *raised).await;
    }
}
