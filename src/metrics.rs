//! Process-wide counters and gauges, snapshotted on demand.
//!
//! Every field is a lock-free atomic updated with `Ordering::Relaxed` on
//! the hot path — these are independent counters, not a composite
//! invariant, so there is nothing for a stronger ordering to protect.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::writer::WriterStats;

/// Shared counters updated from the hub task, the session pumps, and the
/// writer pool.
#[derive(Debug, Default)]
pub struct Metrics {
    connected_clients: AtomicI64,

    total_connections: AtomicU64,
    total_disconnects: AtomicU64,

    messages_in: AtomicU64,
    messages_out: AtomicU64,

    broadcasts: AtomicU64,
    dropped_slow_clients: AtomicU64,
    dropped_send_messages: AtomicU64,

    start: Option<Instant>,
}

/// JSON-serializable point-in-time view of [`Metrics`] plus the writer
/// pool's own counters.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since the process started.
    pub uptime_seconds: f64,

    /// Current number of registered sessions.
    pub connected_clients: i64,

    /// Lifetime count of successful registrations.
    pub total_connections: u64,
    /// Lifetime count of unregistrations.
    pub total_disconnects: u64,

    /// Lifetime count of inbound frames received.
    pub messages_in: u64,
    /// Lifetime count of outbound frames written.
    pub messages_out: u64,

    /// Lifetime count of payloads posted to the hub's broadcast channel.
    pub broadcasts: u64,
    /// Lifetime count of sessions evicted for a full outbox.
    pub dropped_slow_clients: u64,
    /// Lifetime count of individual broadcast sends dropped to a full outbox.
    pub dropped_send_messages: u64,

    /// Lifetime count of locations accepted onto the writer queue.
    pub writer_enqueued: u64,
    /// Lifetime count of locations dropped because the writer queue was full.
    pub writer_dropped: u64,
    /// Lifetime count of locations successfully persisted.
    pub writer_written: u64,
    /// Lifetime count of store errors encountered by writer workers.
    pub writer_errors: u64,
}

impl Metrics {
    /// Construct a fresh counter set with its clock started now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Some(Instant::now()),
            ..Self::default()
        }
    }

    /// A session registered with the hub.
    pub fn record_connect(&self) {
        self.connected_clients.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// A session was removed from the hub.
    pub fn record_disconnect(&self) {
        self.connected_clients.fetch_sub(1, Ordering::Relaxed);
        self.total_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// One inbound frame was read off a session's transport.
    pub fn record_message_in(&self) {
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    /// One outbound frame was written to a session's transport.
    pub fn record_message_out(&self) {
        self.messages_out.fetch_add(1, Ordering::Relaxed);
    }

    /// A payload was accepted onto the hub's broadcast channel.
    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// A broadcast attempt found a session's outbox full.
    pub fn record_dropped_send(&self) {
        self.dropped_send_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// A session was evicted because its outbox was found full.
    pub fn record_dropped_slow_client(&self) {
        self.dropped_slow_clients.fetch_add(1, Ordering::Relaxed);
    }

    /// Current connected-client gauge value.
    #[must_use]
    pub fn connected_clients(&self) -> i64 {
        self.connected_clients.load(Ordering::Relaxed)
    }

    /// Render a JSON-serializable snapshot, pulling the writer pool's own
    /// counters in directly rather than keeping a shadow copy that could
    /// drift out of sync.
    #[must_use]
    pub fn snapshot(&self, writer_stats: &WriterStats) -> MetricsSnapshot {
        let uptime_seconds = self
            .start
            .map(|s| s.elapsed().as_secs_f64())
            .unwrap_or_default();
        let (writer_enqueued, writer_dropped, writer_written, writer_errors) =
            writer_stats.snapshot();

        MetricsSnapshot {
            uptime_seconds,
            connected_clients: self.connected_clients.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            total_disconnects: self.total_disconnects.load(Ordering::Relaxed),
            messages_in: self.messages_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            dropped_slow_clients: self.dropped_slow_clients.load(Ordering::Relaxed),
            dropped_send_messages: self.dropped_send_messages.load(Ordering::Relaxed),
            writer_enqueued,
            writer_dropped,
            writer_written,
            writer_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_disconnect_balance() {
        let m = Metrics::new();
        m.record_connect();
        m.record_connect();
        m.record_disconnect();
        assert_eq!(m.connected_clients(), 1);

        let stats = WriterStats::default();
        let snap = m.snapshot(&stats);
        assert_eq!(snap.total_connections, 2);
        assert_eq!(snap.total_disconnects, 1);
        assert_eq!(snap.connected_clients, 1);
    }
}
