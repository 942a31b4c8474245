//! Application-wide constants for geobeacon-hub.
//!
//! Centralizes the defaults `Config::from_env` falls back to when an
//! environment variable is absent or unparsable, plus the handful of
//! fixed protocol constants that are not operator-tunable.

use std::time::Duration;

// ============================================================================
// Socket liveness defaults
// ============================================================================

/// Default write deadline for a single outbound frame.
pub const DEFAULT_WRITE_WAIT_MS: u64 = 5_000;

/// Default read deadline; refreshed on every pong received from the client.
pub const DEFAULT_PONG_WAIT_MS: u64 = 60_000;

/// Default interval between server-initiated pings.
///
/// Must stay below `DEFAULT_PONG_WAIT_MS` or a healthy client would never
/// get a ping often enough to keep renewing its own read deadline.
pub const DEFAULT_PING_PERIOD_MS: u64 = 50_000;

// ============================================================================
// Buffer sizes
// ============================================================================

/// Default maximum size of a single inbound WebSocket frame, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 2_048;

/// Default capacity of a session's outbound mailbox.
pub const DEFAULT_SEND_BUFFER: usize = 128;

/// Default capacity of the hub's internal broadcast channel.
pub const DEFAULT_BROADCAST_BUF: usize = 4_096;

/// Default capacity of the hub's internal register channel.
pub const DEFAULT_REGISTER_BUF: usize = 1_024;

/// Default capacity of the hub's internal unregister channel.
pub const DEFAULT_UNREGISTER_BUF: usize = 1_024;

// ============================================================================
// Store / writer defaults
// ============================================================================

/// Default Redis connection string host:port.
pub const DEFAULT_REDIS_ADDR: &str = "localhost:6379";

/// Default logical Redis database index.
pub const DEFAULT_REDIS_DB: i64 = 0;

/// Default number of writer-pool worker tasks.
pub const DEFAULT_REDIS_WORKERS: usize = 8;

/// Default capacity of the writer pool's internal queue.
pub const DEFAULT_REDIS_QUEUE_SIZE: usize = 100_000;

/// Default time-to-live, in seconds, for a user's detail record.
pub const DEFAULT_LOCATION_TTL_SECONDS: i64 = 120;

/// Interval between TTL sweeper ticks.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Default per-operation timeout applied to a store call that has no
/// caller-supplied deadline.
pub const DEFAULT_STORE_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep applied by a writer worker after a store error, as a crude
/// circuit-breaker against hammering a failing backend in a tight loop.
pub const WRITER_ERROR_BACKOFF: Duration = Duration::from_millis(20);

// ============================================================================
// Redis key layout
// ============================================================================

/// Geospatial sorted-set key holding every user's last known (lng, lat).
pub const GEO_KEY: &str = "geo:users";

/// Sorted-set key mapping user identifier to last-seen unix timestamp.
pub const LAST_SEEN_KEY: &str = "users:last_seen";

/// Format a per-user detail-record key.
pub fn detail_key(user_id: &str) -> String {
    format!("loc:user:{user_id}")
}

// ============================================================================
// Wire protocol
// ============================================================================

/// The only message `type` tag the server currently understands.
pub const MSG_TYPE_LOCATION: &str = "location";

/// Default listener address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
