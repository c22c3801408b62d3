use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use netfilter::{FilterKind, RelayConfig, SlowClientPolicy};

#[derive(Parser, Debug)]
#[command(
    name = "netfilter",
    version,
    about = "Share one upstream TCP/TLS connection among many unix-socket clients"
)]
pub struct Cli {
    /// Upstream host
    pub host: String,

    /// Upstream port
    pub port: u16,

    /// Connect to upstream over TLS (certificates are not verified)
    #[arg(long)]
    pub ssl: bool,

    /// Path of the unix socket clients connect to
    #[arg(long, default_value = "netfilter.sock")]
    pub path: PathBuf,

    /// Filter for data received from upstream (raw, irctojson, jsontoirc)
    #[arg(long, default_value = "raw")]
    pub recvfilter: FilterKind,

    /// Filter for data sent by clients (raw, irctojson, jsontoirc)
    #[arg(long, default_value = "raw")]
    pub sendfilter: FilterKind,

    /// Upstream connect timeout in seconds
    #[arg(long, default_value = "30")]
    pub connect_timeout: u64,

    /// Per-client and outbound queue capacity, in messages
    #[arg(long, default_value = "64")]
    pub queue_capacity: usize,

    /// What to do with a client whose queue is full
    #[arg(long, value_enum, default_value = "disconnect")]
    pub slow_client: SlowClient,

    /// How long a full client may stall before being disconnected, in ms
    #[arg(long, default_value = "5000")]
    pub slow_client_timeout: u64,

    /// Dial upstream right away instead of waiting for the first client
    #[arg(long)]
    pub no_wait: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlowClient {
    Block,
    Drop,
    Disconnect,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    pub fn into_config(self) -> RelayConfig {
        let policy = match self.slow_client {
            SlowClient::Block => SlowClientPolicy::Block,
            SlowClient::Drop => SlowClientPolicy::Drop,
            SlowClient::Disconnect => {
                SlowClientPolicy::Disconnect(Duration::from_millis(self.slow_client_timeout))
            }
        };

        RelayConfig::new(self.host, self.port)
            .tls(self.ssl)
            .socket_path(self.path)
            .recv_filter(self.recvfilter)
            .send_filter(self.sendfilter)
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .client_queue_capacity(self.queue_capacity)
            .outbound_queue_capacity(self.queue_capacity)
            .slow_client_policy(policy)
            .wait_for_first_client(!self.no_wait)
    }
}
