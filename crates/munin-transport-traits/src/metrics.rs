//! Transport metrics types.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A serializable snapshot of a listener's metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMetrics {
    /// Total number of bytes sent to clients.
    pub bytes_sent: u64,

    /// Total number of bytes received from clients.
    pub bytes_received: u64,

    /// Total number of connections handed out by `accept`.
    pub connections: u64,

    /// Total number of connections refused by an access rule.
    pub rejected_connections: u64,

    /// The current number of open client connections.
    pub active_connections: u64,
}

/// A lock-free, atomic structure for metrics updates.
///
/// Listeners share one instance with every client they accept so byte counts
/// roll up to the listener.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    /// Total bytes sent (atomic counter).
    pub bytes_sent: AtomicU64,

    /// Total bytes received (atomic counter).
    pub bytes_received: AtomicU64,

    /// Total accepted connections (atomic counter).
    pub connections: AtomicU64,

    /// Connections refused by an access rule (atomic counter).
    pub rejected_connections: AtomicU64,

    /// Current open connections (atomic gauge).
    pub active_connections: AtomicU64,
}

impl AtomicMetrics {
    /// Creates a new `AtomicMetrics` instance with all counters initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly accepted connection.
    pub fn record_connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a closed connection. Saturates at zero.
    pub fn record_connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Records a connection refused by an access rule.
    pub fn record_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Creates a serializable `TransportMetrics` snapshot from the current atomic values.
    pub fn snapshot(&self) -> TransportMetrics {
        TransportMetrics {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
        }
    }
}
