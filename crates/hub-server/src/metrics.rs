//! Hub-wide counters.
//!
//! Plain atomics updated from the hub loop and client supervisors; read
//! through a serializable snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct HubMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    messages_delivered: AtomicU64,
    messages_dropped: AtomicU64,
    duplicate_registrations: AtomicU64,
    unknown_unregistrations: AtomicU64,
    encode_failures: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_delivered(&self, count: u64) {
        self.messages_delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_dropped(&self, count: u64) {
        self.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_duplicate(&self) {
        self.duplicate_registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unknown_unregister(&self) {
        self.unknown_unregistrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot for reporting
    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            duplicate_registrations: self.duplicate_registrations.load(Ordering::Relaxed),
            unknown_unregistrations: self.unknown_unregistrations.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot (serializable)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubMetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub duplicate_registrations: u64,
    pub unknown_unregistrations: u64,
    pub encode_failures: u64,
}

impl HubMetricsSnapshot {
    /// Connections opened and not yet closed.
    pub fn connections_active(&self) -> u64 {
        self.connections_opened.saturating_sub(self.connections_closed)
    }
}
