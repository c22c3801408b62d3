//! Relay configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::filter::{FilterKind, DEFAULT_MAX_TOKEN_SIZE};

/// What to do when a client's inbound queue is full during a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlowClientPolicy {
    /// Wait for room. Every other client waits too (head-of-line blocking).
    Block,
    /// Drop the message for that client only
    Drop,
    /// Wait up to the given time, then disconnect the client
    Disconnect(Duration),
}

impl Default for SlowClientPolicy {
    fn default() -> Self {
        SlowClientPolicy::Disconnect(Duration::from_secs(5))
    }
}

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Path of the local unix socket clients connect to
    pub socket_path: PathBuf,

    /// Upstream host name or address
    pub upstream_host: String,

    /// Upstream port
    pub upstream_port: u16,

    /// Wrap the upstream connection in TLS (certificate checks disabled)
    pub tls: bool,

    /// Filter applied to bytes received from upstream
    pub recv_filter: FilterKind,

    /// Filter applied to bytes received from each client
    pub send_filter: FilterKind,

    /// Upstream connect (and TLS handshake) timeout
    pub connect_timeout: Duration,

    /// Per-client inbound queue capacity, in messages
    pub client_queue_capacity: usize,

    /// Shared client-to-upstream queue capacity, in messages
    pub outbound_queue_capacity: usize,

    /// Largest token a filter will buffer
    pub max_token_size: usize,

    /// Handling of clients that cannot keep up with upstream
    pub slow_client_policy: SlowClientPolicy,

    /// Accept one local client before dialing upstream
    pub wait_for_first_client: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("netfilter.sock"),
            upstream_host: "127.0.0.1".to_string(),
            upstream_port: 6667,
            tls: false,
            recv_filter: FilterKind::Raw,
            send_filter: FilterKind::Raw,
            connect_timeout: Duration::from_secs(30),
            client_queue_capacity: 64,
            outbound_queue_capacity: 64,
            max_token_size: DEFAULT_MAX_TOKEN_SIZE,
            slow_client_policy: SlowClientPolicy::default(),
            wait_for_first_client: true,
        }
    }
}

impl RelayConfig {
    /// Create a config for the given upstream
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            upstream_host: host.into(),
            upstream_port: port,
            ..Default::default()
        }
    }

    /// Set the upstream address
    pub fn upstream(mut self, host: impl Into<String>, port: u16) -> Self {
        self.upstream_host = host.into();
        self.upstream_port = port;
        self
    }

    /// Set the local socket path
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Enable or disable TLS to upstream
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls = enabled;
        self
    }

    /// Set the upstream-to-clients filter
    pub fn recv_filter(mut self, kind: FilterKind) -> Self {
        self.recv_filter = kind;
        self
    }

    /// Set the clients-to-upstream filter
    pub fn send_filter(mut self, kind: FilterKind) -> Self {
        self.send_filter = kind;
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set per-client queue capacity
    pub fn client_queue_capacity(mut self, capacity: usize) -> Self {
        self.client_queue_capacity = capacity;
        self
    }

    /// Set shared outbound queue capacity
    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity;
        self
    }

    /// Set maximum token size
    pub fn max_token_size(mut self, size: usize) -> Self {
        self.max_token_size = size;
        self
    }

    /// Set slow-client handling
    pub fn slow_client_policy(mut self, policy: SlowClientPolicy) -> Self {
        self.slow_client_policy = policy;
        self
    }

    /// Dial upstream immediately instead of waiting for a first client
    pub fn wait_for_first_client(mut self, wait: bool) -> Self {
        self.wait_for_first_client = wait;
        self
    }

    /// Check values that would otherwise fail at runtime
    pub fn validate(&self) -> Result<()> {
        if self.upstream_host.is_empty() {
            return Err(Error::Config("upstream host is empty".into()));
        }
        if self.client_queue_capacity == 0 || self.outbound_queue_capacity == 0 {
            return Err(Error::Config("queue capacity must be at least 1".into()));
        }
        if self.max_token_size == 0 {
            return Err(Error::Config("max token size must be at least 1".into()));
        }
        if self.socket_path.as_os_str().is_empty() {
            return Err(Error::Config("socket path is empty".into()));
        }
        Ok(())
    }
}
