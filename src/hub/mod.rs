//! The hub: a single-writer registry of connected sessions that serializes
//! membership changes and fans broadcasts out to every session's outbox.

pub mod session;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::lossy::LossyChannel;
use crate::metrics::Metrics;

/// A registered session's entry in the hub's membership set: just enough
/// to post to its outbox and identify it for removal.
struct SessionEntry {
    outbox: LossyChannel<Vec<u8>>,
}

/// Cheaply-cloneable handle to the hub. Passed to the upgrade handler and
/// to each session; the actual membership set and run loop live behind it.
#[derive(Clone)]
pub struct Hub {
    register_chan: LossyChannel<(u64, LossyChannel<Vec<u8>>)>,
    unregister_chan: LossyChannel<u64>,
    broadcast_chan: LossyChannel<Vec<u8>>,
    sessions: Arc<RwLock<HashMap<u64, SessionEntry>>>,
    next_id: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
}

impl Hub {
    /// Construct a hub and spawn its run loop. `register_buf`,
    /// `unregister_buf`, and `broadcast_buf` size the three internal
    /// channels; see [`crate::config::Config`].
    #[must_use]
    pub fn spawn(
        register_buf: usize,
        unregister_buf: usize,
        broadcast_buf: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (register_chan, register_rx) = LossyChannel::new(register_buf);
        let (unregister_chan, unregister_rx) = LossyChannel::new(unregister_buf);
        let (broadcast_chan, broadcast_rx) = LossyChannel::new(broadcast_buf);

        let sessions = Arc::new(RwLock::new(HashMap::new()));

        let hub = Self {
            register_chan,
            unregister_chan,
            broadcast_chan,
            sessions: Arc::clone(&sessions),
            next_id: Arc::new(AtomicU64::new(1)),
            metrics: Arc::clone(&metrics),
        };

        tokio::spawn(run(sessions, metrics, register_rx, unregister_rx, broadcast_rx, hub.clone()));

        hub
    }

    /// Allocate a fresh session id. Session construction calls this before
    /// registering, so the caller can build its outbox with a known id
    /// ahead of the register round-trip.
    #[must_use]
    pub fn next_session_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a session's outbox under `id`. Suspends the caller if the
    /// register channel is momentarily full; never drops a registration.
    pub async fn register(&self, id: u64, outbox: LossyChannel<Vec<u8>>) {
        let _ = self.register_chan.post((id, outbox)).await;
    }

    /// Request removal of session `id`. Idempotent: unregistering a
    /// session that is already gone (or never existed) is a no-op.
    pub async fn unregister(&self, id: u64) {
        let _ = self.unregister_chan.post(id).await;
    }

    /// Post `payload` to the broadcast channel without blocking. On a full
    /// channel the payload is silently dropped; this is a process-wide
    /// back-pressure valve, distinct from the per-session outbox drops
    /// counted as slow-client evictions.
    pub fn broadcast(&self, payload: Vec<u8>) {
        let _ = self.broadcast_chan.try_post(payload);
    }

    /// Current number of registered sessions. Reads the set directly
    /// under its own lock rather than going through the run loop.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// The hub's single long-lived task: the only writer of the session set.
async fn run(
    sessions: Arc<RwLock<HashMap<u64, SessionEntry>>>,
    metrics: Arc<Metrics>,
    mut register_rx: mpsc::Receiver<(u64, LossyChannel<Vec<u8>>)>,
    mut unregister_rx: mpsc::Receiver<u64>,
    mut broadcast_rx: mpsc::Receiver<Vec<u8>>,
    hub: Hub,
) {
    loop {
        tokio::select! {
            maybe = register_rx.recv() => {
                match maybe {
                    Some((id, outbox)) => {
                        sessions.write().await.insert(id, SessionEntry { outbox });
                        metrics.record_connect();
                    }
                    None => break,
                }
            }
            maybe = unregister_rx.recv() => {
                match maybe {
                    Some(id) => {
                        // Still a member? Makes unregister idempotent: a
                        // session can be evicted for a slow outbox and then
                        // unregister itself on transport close without a
                        // double-decrement.
                        if sessions.write().await.remove(&id).is_some() {
                            metrics.record_disconnect();
                        }
                    }
                    None => break,
                }
            }
            maybe = broadcast_rx.recv() => {
                match maybe {
                    Some(payload) => {
                        metrics.record_broadcast();
                        let set = sessions.read().await;
                        for (&id, entry) in set.iter() {
                            if !entry.outbox.try_post(payload.clone()) {
                                metrics.record_dropped_send();
                                metrics.record_dropped_slow_client();
                                // Must not unregister inline: that needs the
                                // write lock we're holding this read lock
                                // against. Spawn it instead.
                                let hub = hub.clone();
                                tokio::spawn(async move { hub.unregister(id).await });
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lossy::LossyChannel;

    async fn test_hub() -> Hub {
        Hub::spawn(16, 16, 16, Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn register_then_unregister_balances_membership() {
        let hub = test_hub().await;
        let (outbox, _rx) = LossyChannel::new(4);
        let id = hub.next_session_id();
        hub.register(id, outbox).await;

        // Give the run loop a tick to process.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(hub.session_count().await, 1);

        hub.unregister(id).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(hub.session_count().await, 0);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = test_hub().await;
        hub.unregister(999).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(hub.metrics.snapshot(&Default::default()).total_disconnects, 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_outbox() {
        let hub = test_hub().await;
        let (outbox_a, mut rx_a) = LossyChannel::new(4);
        let (outbox_b, mut rx_b) = LossyChannel::new(4);
        hub.register(hub.next_session_id(), outbox_a).await;
        hub.register(hub.next_session_id(), outbox_b).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        hub.broadcast(b"hello".to_vec());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(rx_a.try_recv().unwrap(), b"hello");
        assert_eq!(rx_b.try_recv().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn full_outbox_schedules_eviction_without_blocking_other_sessions() {
        let hub = test_hub().await;

        // Capacity 1, pre-filled, so the next broadcast finds it full.
        let (slow_outbox, _rx_slow) = LossyChannel::new(1);
        assert!(slow_outbox.try_post(b"seed".to_vec()));
        let (fast_outbox, mut rx_fast) = LossyChannel::new(4);

        hub.register(hub.next_session_id(), slow_outbox).await;
        hub.register(hub.next_session_id(), fast_outbox).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(hub.session_count().await, 2);

        hub.broadcast(b"hello".to_vec());

        // The fast session still gets the frame immediately...
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(rx_fast.try_recv().unwrap(), b"hello");

        // ...and the slow one is evicted shortly after, asynchronously.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(hub.session_count().await, 1);
    }
}
