//! Deterministic in-memory [`LocationStore`], used by tests so the
//! concurrency core can be exercised without a live Redis.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use super::{Location, LocationStore, StoreError};

struct Detail {
    lat: f64,
    lng: f64,
    accuracy: f64,
    ts: i64,
    expires_at: Option<Instant>,
}

/// The three indices, updated together under one lock so a concurrent
/// reader can never observe only some of them changed.
#[derive(Default)]
struct Indices {
    spatial: HashMap<String, (f64, f64)>,
    last_seen: HashMap<String, i64>,
    detail: HashMap<String, Detail>,
}

/// An in-memory stand-in for the Redis-backed store, upholding the same
/// atomic-upsert and TTL-sweep contract.
pub struct MemoryStore {
    ttl_seconds: i64,
    indices: Mutex<Indices>,
}

impl MemoryStore {
    /// Construct a store with TTL disabled (detail records never expire
    /// on their own; only `sweep` removes stale index entries).
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(0)
    }

    /// Construct a store with a detail-record TTL of `ttl_seconds`.
    #[must_use]
    pub fn with_ttl(ttl_seconds: i64) -> Self {
        Self {
            ttl_seconds,
            indices: Mutex::new(Indices::default()),
        }
    }

    /// Whether a (non-expired) detail record exists for `user_id`.
    #[must_use]
    pub fn contains(&self, user_id: &str) -> bool {
        match self.indices.lock().unwrap().detail.get(user_id) {
            Some(d) => d.expires_at.map_or(true, |exp| Instant::now() < exp),
            None => false,
        }
    }

    /// The raw `(lat, lng)` most recently saved for `user_id`, if any
    /// (regardless of detail-record TTL; used to assert spoof rejection).
    #[must_use]
    pub fn spatial_point(&self, user_id: &str) -> Option<(f64, f64)> {
        self.indices.lock().unwrap().spatial.get(user_id).copied()
    }

    /// Whether `user_id` is still present in the last-seen index.
    #[must_use]
    pub fn in_last_seen(&self, user_id: &str) -> bool {
        self.indices.lock().unwrap().last_seen.contains_key(user_id)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn save_location(
        &self,
        loc: Location,
        _deadline: Option<Duration>,
    ) -> Result<(), StoreError> {
        let expires_at = if self.ttl_seconds > 0 {
            Some(Instant::now() + Duration::from_secs(self.ttl_seconds as u64))
        } else {
            None
        };

        // A single lock guards all three indices for the whole upsert, so
        // no external reader can observe a state where only some of them
        // changed.
        let mut indices = self.indices.lock().unwrap();
        indices
            .spatial
            .insert(loc.user_id.clone(), (loc.lng, loc.lat));
        indices.detail.insert(
            loc.user_id.clone(),
            Detail {
                lat: loc.lat,
                lng: loc.lng,
                accuracy: loc.accuracy,
                ts: loc.ts,
                expires_at,
            },
        );
        indices.last_seen.insert(loc.user_id, loc.ts);

        Ok(())
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        let cutoff = now_unix() - self.ttl_seconds;

        let mut indices = self.indices.lock().unwrap();
        let stale: Vec<String> = indices
            .last_seen
            .iter()
            .filter(|(_, &ts)| ts <= cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            indices.last_seen.remove(id);
            indices.spatial.remove(id);
        }

        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_upsert_updates_all_indices() {
        let store = MemoryStore::new();
        store
            .save_location(
                Location {
                    user_id: "a".into(),
                    lat: 10.0,
                    lng: 20.0,
                    accuracy: 1.0,
                    ts: 100,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(store.spatial_point("a"), Some((20.0, 10.0)));
        assert!(store.in_last_seen("a"));
        assert!(store.contains("a"));
    }

    #[tokio::test]
    async fn sweep_evicts_indices_past_cutoff() {
        let store = MemoryStore::with_ttl(1);
        store
            .save_location(
                Location {
                    user_id: "x".into(),
                    lat: 1.0,
                    lng: 1.0,
                    accuracy: 1.0,
                    ts: now_unix() - 100,
                },
                None,
            )
            .await
            .unwrap();

        let evicted = store.sweep().await.unwrap();
        assert_eq!(evicted, 1);
        assert!(!store.in_last_seen("x"));
        assert_eq!(store.spatial_point("x"), None);
    }

    #[tokio::test]
    async fn sweep_is_noop_when_nothing_stale() {
        let store = MemoryStore::with_ttl(3600);
        store
            .save_location(
                Location {
                    user_id: "fresh".into(),
                    lat: 1.0,
                    lng: 1.0,
                    accuracy: 1.0,
                    ts: now_unix(),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(store.sweep().await.unwrap(), 0);
        assert!(store.in_last_seen("fresh"));
    }
}
