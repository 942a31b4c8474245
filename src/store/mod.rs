//! Store contract: the atomic write and expiry semantics any backend must
//! uphold, independent of which engine provides them.
//!
//! [`LocationStore`] is the seam a Redis-backed implementation
//! ([`redis_store::RedisStore`]) and a deterministic in-memory fake
//! ([`memory::MemoryStore`]) both satisfy, so the concurrency core can be
//! exercised in tests without a live Redis.

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A single position observation, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Authenticated user identifier (never the client-claimed one).
    pub user_id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Reported accuracy, in meters.
    pub accuracy: f64,
    /// Unix timestamp, seconds.
    pub ts: i64,
}

/// Failure surface for a store operation.
///
/// Distinguishes "timed out or was cancelled" from "some other backend
/// failure" per the store contract, though both are reported to the
/// writer pool identically (as a save failure to count and log).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation exceeded its deadline, or its governing future was
    /// cancelled before completing.
    #[error("store operation timed out or was cancelled")]
    Timeout,
    /// Any other backend failure (connection error, protocol error, ...).
    #[error("store backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// The two operations a location store must provide atomically.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Upsert the spatial index, detail record, and last-seen index for
    /// `loc.user_id` as a single atomic unit. `deadline` overrides the
    /// store's default operation timeout when supplied.
    async fn save_location(
        &self,
        loc: Location,
        deadline: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Evict every user whose last-seen timestamp is at or before
    /// `now - ttl` from the spatial index and the last-seen index.
    ///
    /// Best-effort: a backend failure here is swallowed by the caller and
    /// retried on the sweeper's next tick. Returns the number of users
    /// evicted, for logging.
    async fn sweep(&self) -> Result<usize, StoreError>;
}
