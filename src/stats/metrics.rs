//! Counters for relay traffic and client lifecycle

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::relay::registry::DeliveryReport;

/// Relay-wide counters, updated lock-free from every pump
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    clients_accepted: AtomicU64,
    clients_removed: AtomicU64,
    messages_from_upstream: AtomicU64,
    messages_to_upstream: AtomicU64,
    deliveries: AtomicU64,
    dropped_deliveries: AtomicU64,
    stalled_clients: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            clients_accepted: AtomicU64::new(0),
            clients_removed: AtomicU64::new(0),
            messages_from_upstream: AtomicU64::new(0),
            messages_to_upstream: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            dropped_deliveries: AtomicU64::new(0),
            stalled_clients: AtomicU64::new(0),
        }
    }

    pub fn record_client_accepted(&self) {
        self.clients_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_clients_removed(&self, count: u64) {
        self.clients_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_to_upstream(&self) {
        self.messages_to_upstream.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one upstream message and the outcome of broadcasting it
    pub fn record_broadcast(&self, report: &DeliveryReport) {
        self.messages_from_upstream.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped_deliveries
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        self.stalled_clients
            .fetch_add(report.stalled.len() as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            clients_accepted: self.clients_accepted.load(Ordering::Relaxed),
            clients_removed: self.clients_removed.load(Ordering::Relaxed),
            messages_from_upstream: self.messages_from_upstream.load(Ordering::Relaxed),
            messages_to_upstream: self.messages_to_upstream.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dropped_deliveries: self.dropped_deliveries.load(Ordering::Relaxed),
            stalled_clients: self.stalled_clients.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub clients_accepted: u64,
    pub clients_removed: u64,
    pub messages_from_upstream: u64,
    pub messages_to_upstream: u64,
    pub deliveries: u64,
    pub dropped_deliveries: u64,
    pub stalled_clients: u64,
}

impl StatsSnapshot {
    /// Clients accepted and not yet removed
    pub fn active_clients(&self) -> u64 {
        self.clients_accepted.saturating_sub(self.clients_removed)
    }
}
