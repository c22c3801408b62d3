//! Relay engine
//!
//! Many local clients share one upstream session. Everything upstream sends
//! is broadcast to every registered client; everything a client sends is
//! funneled into one outbound queue toward upstream.
//!
//! # Architecture
//!
//! ```text
//!                               Arc<ClientRegistry>
//!                         ┌───────────────────────────┐
//!                         │ Mutex<Vec<ClientHandle {  │
//!                         │   inbound: mpsc::Tx,      │
//!                         │   closed: Signal,         │
//!                         │ }>>                       │
//!                         └─────────────┬─────────────┘
//!                                       │ broadcast()
//!   upstream ──► [UpstreamRelay reader] ┘
//!                                       ┌──► [Client writer] ──► unix socket
//!                                       ├──► [Client writer] ──► unix socket
//!                                       └──► [Client writer] ──► unix socket
//!
//!   unix socket ──► [Client reader] ──┐
//!   unix socket ──► [Client reader] ──┼──► outbound mpsc ──► [UpstreamRelay writer] ──► upstream
//!   unix socket ──► [Client reader] ──┘
//! ```
//!
//! # Teardown
//!
//! A client pump that stops sends the client's id to the
//! [`ShutdownCoordinator`], which removes it from the registry and raises the
//! client's close signal so the sibling pump stops too. Losing upstream, or
//! an accept error, raises the relay-wide [`Shutdown`] signal: the acceptor
//! stops, the socket file is removed and all remaining clients are closed.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod listener;
pub mod registry;
pub mod server;
pub mod signal;
pub mod upstream;

pub use client::{Client, ClientContext, ClientHandle, ClientId, Delivery};
pub use config::{RelayConfig, SlowClientPolicy};
pub use coordinator::ShutdownCoordinator;
pub use listener::Acceptor;
pub use registry::{ClientRegistry, DeliveryReport};
pub use server::Relay;
pub use signal::{Signal, Signal as Shutdown, SignalListener};
pub use upstream::{connect, UpstreamContext, UpstreamRelay, UpstreamStream};
