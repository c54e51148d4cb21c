//! Chat gateway metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Gateway-level counters.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    /// Connections that passed authorization
    pub connections_opened: AtomicU64,
    /// Connections torn down
    pub connections_closed: AtomicU64,
    /// Connections refused during authentication or authorization
    pub connections_rejected: AtomicU64,
    /// Inbound text frames
    pub frames_received: AtomicU64,
    /// Outbound frames queued
    pub frames_sent: AtomicU64,
    /// Sockets pruned after a failed write
    pub sockets_pruned: AtomicU64,
    /// Error frames sent back to clients
    pub protocol_errors: AtomicU64,
    /// Chat messages persisted through the gateway
    pub messages_persisted: AtomicU64,
}

impl RealtimeMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an authorized connection
    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a torn down connection
    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refused connection
    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an inbound frame
    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `n` queued outbound frames
    pub fn frames_sent(&self, n: u64) {
        self.frames_sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Record a pruned socket
    pub fn socket_pruned(&self) {
        self.sockets_pruned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error frame
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a persisted chat message
    pub fn message_persisted(&self) {
        self.messages_persisted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            sockets_pruned: self.sockets_pruned.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            messages_persisted: self.messages_persisted.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Connections that passed authorization
    pub connections_opened: u64,
    /// Connections torn down
    pub connections_closed: u64,
    /// Connections refused
    pub connections_rejected: u64,
    /// Inbound text frames
    pub frames_received: u64,
    /// Outbound frames queued
    pub frames_sent: u64,
    /// Sockets pruned after a failed write
    pub sockets_pruned: u64,
    /// Error frames sent
    pub protocol_errors: u64,
    /// Chat messages persisted
    pub messages_persisted: u64,
}
