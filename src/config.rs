//! Process configuration, loaded once from the environment at startup.
//!
//! Mirrors the reference service's variable names so an operator migrating
//! from it doesn't have to relearn anything. An unparsable integer value
//! falls back to its documented default rather than aborting the process;
//! the one thing that *does* fail fast is the `PING_PERIOD_MS < PONG_WAIT_MS`
//! liveness invariant, since a misconfigured value there would silently
//! disconnect every client.

use std::time::Duration;

use anyhow::{bail, Result};

use crate::constants;

/// Fully resolved process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listener address, e.g. `"0.0.0.0:8080"`.
    pub addr: String,

    /// Per-write deadline for the session write pump.
    pub write_wait: Duration,
    /// Read deadline, refreshed on every pong.
    pub pong_wait: Duration,
    /// Interval between server-initiated pings.
    pub ping_period: Duration,

    /// Maximum size of a single inbound frame, in bytes.
    pub max_message_bytes: usize,
    /// Capacity of a session's outbound mailbox.
    pub send_buffer: usize,
    /// Capacity of the hub's broadcast channel.
    pub broadcast_buf: usize,
    /// Capacity of the hub's register channel.
    pub register_buf: usize,
    /// Capacity of the hub's unregister channel.
    pub unregister_buf: usize,

    /// Redis `host:port`.
    pub redis_addr: String,
    /// Redis `AUTH` password; empty means no password.
    pub redis_password: String,
    /// Logical Redis database index.
    pub redis_db: i64,
    /// Number of writer-pool worker tasks.
    pub redis_workers: usize,
    /// Capacity of the writer pool's internal queue.
    pub redis_queue_size: usize,
    /// Time-to-live, in seconds, applied to a user's detail record.
    /// Zero or negative disables expiry (the detail record persists).
    pub location_ttl_seconds: i64,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `PING_PERIOD_MS` is not strictly less than
    /// `PONG_WAIT_MS` — a client that respects the advertised pong-wait
    /// would otherwise never receive a ping in time to renew it.
    pub fn from_env() -> Result<Self> {
        let write_wait_ms = getenv_int("WRITE_WAIT_MS", constants::DEFAULT_WRITE_WAIT_MS);
        let pong_wait_ms = getenv_int("PONG_WAIT_MS", constants::DEFAULT_PONG_WAIT_MS);
        let ping_period_ms = getenv_int("PING_PERIOD_MS", constants::DEFAULT_PING_PERIOD_MS);

        if ping_period_ms >= pong_wait_ms {
            bail!(
                "PING_PERIOD_MS ({ping_period_ms}) must be less than PONG_WAIT_MS ({pong_wait_ms}); \
                 otherwise a compliant client would never renew its read deadline in time"
            );
        }

        Ok(Self {
            addr: getenv_string("ADDR", constants::DEFAULT_ADDR),

            write_wait: Duration::from_millis(write_wait_ms),
            pong_wait: Duration::from_millis(pong_wait_ms),
            ping_period: Duration::from_millis(ping_period_ms),

            max_message_bytes: getenv_int(
                "MAX_MESSAGE_BYTES",
                constants::DEFAULT_MAX_MESSAGE_BYTES as u64,
            ) as usize,
            send_buffer: getenv_int("SEND_BUFFER", constants::DEFAULT_SEND_BUFFER as u64) as usize,
            broadcast_buf: getenv_int("BROADCAST_BUF", constants::DEFAULT_BROADCAST_BUF as u64)
                as usize,
            register_buf: getenv_int("REGISTER_BUF", constants::DEFAULT_REGISTER_BUF as u64)
                as usize,
            unregister_buf: getenv_int(
                "UNREGISTER_BUF",
                constants::DEFAULT_UNREGISTER_BUF as u64,
            ) as usize,

            redis_addr: getenv_string("REDIS_ADDR", constants::DEFAULT_REDIS_ADDR),
            redis_password: getenv_string("REDIS_PASSWORD", ""),
            redis_db: getenv_int("REDIS_DB", constants::DEFAULT_REDIS_DB as u64) as i64,
            redis_workers: getenv_int(
                "REDIS_WORKERS",
                constants::DEFAULT_REDIS_WORKERS as u64,
            ) as usize,
            redis_queue_size: getenv_int(
                "REDIS_QUEUE_SIZE",
                constants::DEFAULT_REDIS_QUEUE_SIZE as u64,
            ) as usize,
            location_ttl_seconds: getenv_int(
                "LOCATION_TTL_SECONDS",
                constants::DEFAULT_LOCATION_TTL_SECONDS as u64,
            ) as i64,
        })
    }
}

/// Read a string environment variable, falling back to `default` when unset.
fn getenv_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an integer environment variable, falling back to `default` when
/// unset OR unparsable. A typo in an operator's env file should degrade to
/// the default, not crash the process at startup.
fn getenv_int(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for key in [
            "ADDR",
            "WRITE_WAIT_MS",
            "PONG_WAIT_MS",
            "PING_PERIOD_MS",
            "MAX_MESSAGE_BYTES",
            "SEND_BUFFER",
            "BROADCAST_BUF",
            "REGISTER_BUF",
            "UNREGISTER_BUF",
            "REDIS_ADDR",
            "REDIS_PASSWORD",
            "REDIS_DB",
            "REDIS_WORKERS",
            "REDIS_QUEUE_SIZE",
            "LOCATION_TTL_SECONDS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.addr, constants::DEFAULT_ADDR);
        assert_eq!(cfg.redis_workers, constants::DEFAULT_REDIS_WORKERS);
        assert_eq!(
            cfg.location_ttl_seconds,
            constants::DEFAULT_LOCATION_TTL_SECONDS
        );
    }

    #[test]
    fn unparsable_int_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("REDIS_WORKERS", "not-a-number");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.redis_workers, constants::DEFAULT_REDIS_WORKERS);
        std::env::remove_var("REDIS_WORKERS");
    }

    #[test]
    fn rejects_ping_period_not_less_than_pong_wait() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("PING_PERIOD_MS", "60000");
        std::env::set_var("PONG_WAIT_MS", "60000");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("must be less than"));
        clear_all();
    }
}
