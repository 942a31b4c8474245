//! Redis-backed [`LocationStore`].
//!
//! Atomicity across the spatial index, detail record, and last-seen index
//! is provided by a server-side Lua script (`EVAL`), not three separate
//! round-trips — a multi-call implementation would let a reader observe a
//! torn update, which the store contract forbids.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tokio::sync::Semaphore;

use crate::constants::{detail_key, DEFAULT_STORE_OP_TIMEOUT, GEO_KEY, LAST_SEEN_KEY};

use super::{Location, LocationStore, StoreError};

/// `KEYS[1]` = geo key, `KEYS[2]` = per-user detail key, `KEYS[3]` = last-seen key.
/// `ARGV` = user id, lng, lat, accuracy, ts, ttl in milliseconds (0 = no expiry).
const SAVE_LOCATION_LUA: &str = r"
redis.call('GEOADD', KEYS[1], ARGV[2], ARGV[3], ARGV[1])
redis.call('HSET', KEYS[2], 'lat', ARGV[3], 'lng', ARGV[2], 'accuracy', ARGV[4], 'ts', ARGV[5])
local ttl = tonumber(ARGV[6])
if ttl and ttl > 0 then
  redis.call('PEXPIRE', KEYS[2], ttl)
else
  redis.call('PERSIST', KEYS[2])
end
redis.call('ZADD', KEYS[3], ARGV[5], ARGV[1])
return 1
";

/// A Redis-backed implementation of the store contract.
pub struct RedisStore {
    conn: ConnectionManager,
    ttl: Duration,
    op_timeout: Duration,
    inflight: Arc<Semaphore>,
    save_script: Script,
}

impl RedisStore {
    /// Connect to `addr` (host:port), authenticating with `password` if
    /// non-empty and selecting logical database `db`. `ttl` of zero
    /// disables expiry on the detail record. `pool_size` bounds the
    /// number of concurrent in-flight operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis client cannot be constructed or the
    /// initial connection fails.
    pub async fn connect(
        addr: &str,
        password: &str,
        db: i64,
        ttl_seconds: i64,
        pool_size: usize,
    ) -> anyhow::Result<Self> {
        let url = build_redis_url(addr, password, db);
        let client = redis::Client::open(url).context("building redis client")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("connecting to redis")?;

        Ok(Self {
            conn,
            ttl: Duration::from_secs(ttl_seconds.max(0) as u64),
            op_timeout: DEFAULT_STORE_OP_TIMEOUT,
            inflight: Arc::new(Semaphore::new(pool_size.max(1))),
            save_script: Script::new(SAVE_LOCATION_LUA),
        })
    }
}

fn build_redis_url(addr: &str, password: &str, db: i64) -> String {
    if password.is_empty() {
        format!("redis://{addr}/{db}")
    } else {
        format!("redis://:{password}@{addr}/{db}")
    }
}

#[async_trait]
impl LocationStore for RedisStore {
    async fn save_location(
        &self,
        loc: Location,
        deadline: Option<Duration>,
    ) -> Result<(), StoreError> {
        let _permit = self
            .inflight
            .acquire()
            .await
            .map_err(|_| StoreError::Timeout)?;

        let ttl_ms = self.ttl.as_millis() as i64;
        let key = detail_key(&loc.user_id);
        let mut conn = self.conn.clone();

        let call = async {
            self.save_script
                .key(GEO_KEY)
                .key(key)
                .key(LAST_SEEN_KEY)
                .arg(loc.user_id)
                .arg(loc.lng)
                .arg(loc.lat)
                .arg(loc.accuracy)
                .arg(loc.ts)
                .arg(ttl_ms)
                .invoke_async::<i64>(&mut conn)
                .await
        };

        match tokio::time::timeout(deadline.unwrap_or(self.op_timeout), call).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(StoreError::Backend(anyhow::Error::new(err))),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        let cutoff = now_unix() - self.ttl.as_secs() as i64;
        let mut conn = self.conn.clone();

        let stale: Vec<String> = tokio::time::timeout(
            self.op_timeout,
            conn.zrangebyscore(LAST_SEEN_KEY, "-inf", cutoff),
        )
        .await
        .map_err(|_| StoreError::Timeout)?
        .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?;

        if stale.is_empty() {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.zrem(GEO_KEY, &stale);
        pipe.zrem(LAST_SEEN_KEY, &stale);

        tokio::time::timeout(self.op_timeout, pipe.query_async::<()>(&mut conn))
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?;

        Ok(stale.len())
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Spawn the periodic sweeper task. Errors are logged and swallowed; the
/// next tick simply tries again, matching the reference implementation's
/// best-effort cleanup policy.
pub fn spawn_sweeper(store: Arc<dyn LocationStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.sweep().await {
                Ok(0) => {}
                Ok(n) => log::info!("sweeper evicted {n} stale user(s)"),
                Err(err) => log::warn!("sweeper tick failed: {err}"),
            }
        }
    })
}
