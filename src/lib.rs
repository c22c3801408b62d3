//! netfilter: share one upstream connection among many local clients
//!
//! Clients connect to a unix socket. Whatever the upstream server sends is
//! broadcast to every connected client, and whatever any client sends is
//! forwarded upstream. Both directions pass through a pluggable [`filter`]
//! that frames the byte stream and can transcode it, e.g. IRC lines to JSON
//! documents and back.
//!
//! # Example
//!
//! ```no_run
//! use netfilter::{FilterKind, Relay, RelayConfig};
//!
//! # async fn run() -> netfilter::Result<()> {
//! let config = RelayConfig::new("irc.libera.chat", 6697)
//!     .tls(true)
//!     .socket_path("/tmp/libera.sock")
//!     .recv_filter(FilterKind::IrcToJson)
//!     .send_filter(FilterKind::JsonToIrc);
//!
//! Relay::new(config).run().await
//! # }
//! ```

pub mod error;
pub mod filter;
pub mod irc;
pub mod relay;
pub mod stats;
pub mod tls;

pub use error::{Error, FilterError, Result};
pub use filter::{Filter, FilterKind, Scanner};
pub use relay::{Relay, RelayConfig, Shutdown, SlowClientPolicy};
pub use stats::{RelayStats, StatsSnapshot};
