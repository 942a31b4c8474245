//! A bounded, lossy channel: non-blocking producer, dropped on full.
//!
//! The broadcast channel, a session's outbox, and the write side of the
//! writer queue are all instances of the same pattern — a fixed-capacity
//! FIFO where a full queue means "drop the newest item", never "block the
//! producer". This is the `tokio::sync::mpsc`-backed half of that pattern
//! (the writer pool uses `async_channel` instead, since it needs a
//! multi-consumer receiver; the try-send-or-drop shape is identical).

use tokio::sync::mpsc;

/// A bounded channel whose producer never blocks and never errors: a full
/// or closed queue is reported as `false` from [`LossyChannel::try_post`]
/// and left to the caller to count or act on.
pub struct LossyChannel<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for LossyChannel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> LossyChannel<T> {
    /// Construct a bounded lossy channel, returning the producer half and
    /// the raw receiver for the consumer to drain.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Attempt to post `item` without blocking. Returns `false` if the
    /// queue is full or the consumer has already gone away.
    pub fn try_post(&self, item: T) -> bool {
        self.tx.try_send(item).is_ok()
    }

    /// Post `item`, suspending the caller if the queue is momentarily full.
    /// Used for control-plane traffic (register/unregister) where losing a
    /// message would be worse than a brief wait.
    pub async fn post(&self, item: T) -> Result<(), mpsc::error::SendError<T>> {
        self.tx.send(item).await
    }
}
