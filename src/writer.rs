//! Bounded, lossy persistence queue fronted by a fixed worker pool.
//!
//! Decouples ingest throughput from the store's latency: `enqueue` never
//! blocks the caller, and a slow or unavailable backend only ever costs
//! the writer pool its own queue, never the session pumps upstream of it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::constants::WRITER_ERROR_BACKOFF;
use crate::store::{Location, LocationStore};

/// Four monotonically non-decreasing counters tracking the writer pool's
/// lifetime behavior.
#[derive(Debug, Default)]
pub struct WriterStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    errors: AtomicU64,
}

impl WriterStats {
    /// Read all four counters at once.
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.enqueued.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
            self.written.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }
}

/// A bounded queue of pending [`Location`] writes, drained by a fixed pool
/// of worker tasks.
#[derive(Debug)]
pub struct WriterPool {
    tx: async_channel::Sender<Location>,
    stats: Arc<WriterStats>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WriterPool {
    /// Spawn `workers` worker tasks draining a queue of capacity
    /// `queue_capacity`, each persisting to `store`.
    ///
    /// A `workers` of zero is legal (tests use it to simulate a stalled
    /// pool): locations simply accumulate until the queue is full and then
    /// start being dropped, with no task ever consuming them.
    #[must_use]
    pub fn spawn(store: Arc<dyn LocationStore>, queue_capacity: usize, workers: usize) -> Self {
        let (tx, rx) = async_channel::bounded(queue_capacity.max(1));
        let stats = Arc::new(WriterStats::default());

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let rx = rx.clone();
            let store = Arc::clone(&store);
            let stats = Arc::clone(&stats);
            handles.push(tokio::spawn(worker_loop(worker_id, rx, store, stats)));
        }

        Self {
            tx,
            stats,
            workers: handles,
        }
    }

    /// Offer a location to the queue. Never blocks: on a full queue the
    /// location is dropped and `dropped` is incremented.
    pub fn enqueue(&self, loc: Location) {
        match self.tx.try_send(loc) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Live counters, shared with [`crate::metrics::Metrics::snapshot`].
    #[must_use]
    pub fn stats(&self) -> Arc<WriterStats> {
        Arc::clone(&self.stats)
    }

    /// Signal workers to stop. Draining semantics are not guaranteed: a
    /// location still sitting in the queue when shutdown is called may
    /// never be written.
    pub fn shutdown(&self) {
        self.tx.close();
        for handle in &self.workers {
            handle.abort();
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: async_channel::Receiver<Location>,
    store: Arc<dyn LocationStore>,
    stats: Arc<WriterStats>,
) {
    while let Ok(loc) = rx.recv().await {
        match store.save_location(loc, None).await {
            Ok(()) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                log::error!("[writer-{worker_id}] save error: {err}");
                tokio::time::sleep(WRITER_ERROR_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn enqueue_is_written_by_worker() {
        let store = Arc::new(MemoryStore::new());
        let pool = WriterPool::spawn(store.clone(), 16, 2);

        pool.enqueue(Location {
            user_id: "a".into(),
            lat: 1.0,
            lng: 2.0,
            accuracy: 3.0,
            ts: 10,
        });

        // Give the worker a tick to drain the queue.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (enqueued, dropped, written, errors) = pool.stats().snapshot();
        assert_eq!(enqueued, 1);
        assert_eq!(dropped, 0);
        assert_eq!(written, 1);
        assert_eq!(errors, 0);
        assert!(store.contains("a"));

        pool.shutdown();
    }

    #[tokio::test]
    async fn overflow_with_stalled_workers_is_bounded_and_counted() {
        let store = Arc::new(MemoryStore::new());
        // Zero workers: nothing ever drains the queue.
        let pool = WriterPool::spawn(store, 10, 0);

        for i in 0..15 {
            pool.enqueue(Location {
                user_id: format!("user-{i}"),
                lat: 0.0,
                lng: 0.0,
                accuracy: 0.0,
                ts: i,
            });
        }

        let (enqueued, dropped, written, _errors) = pool.stats().snapshot();
        assert_eq!(enqueued, 10);
        assert_eq!(dropped, 5);
        assert_eq!(written, 0);

        pool.shutdown();
    }
}
