//! Process entry point: loads configuration, wires the store, writer
//! pool, hub, and sweeper together, and serves the HTTP/WS surface until
//! a shutdown signal arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use geobeacon_hub::config::Config;
use geobeacon_hub::constants::SWEEP_INTERVAL;
use geobeacon_hub::http::{self, AppState};
use geobeacon_hub::hub::Hub;
use geobeacon_hub::metrics::Metrics;
use geobeacon_hub::store::redis_store::{spawn_sweeper, RedisStore};
use geobeacon_hub::store::LocationStore;
use geobeacon_hub::writer::WriterPool;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cfg = Arc::new(Config::from_env().context("loading configuration")?);
    log::info!("starting geobeacon-hub on {}", cfg.addr);

    let store: Arc<dyn LocationStore> = Arc::new(
        RedisStore::connect(
            &cfg.redis_addr,
            &cfg.redis_password,
            cfg.redis_db,
            cfg.location_ttl_seconds,
            cfg.redis_workers.max(1),
        )
        .await
        .context("connecting to redis")?,
    );

    let writer = Arc::new(WriterPool::spawn(
        Arc::clone(&store),
        cfg.redis_queue_size,
        cfg.redis_workers,
    ));
    let metrics = Arc::new(Metrics::new());
    let hub = Hub::spawn(
        cfg.register_buf,
        cfg.unregister_buf,
        cfg.broadcast_buf,
        Arc::clone(&metrics),
    );

    let _sweeper = spawn_sweeper(Arc::clone(&store), SWEEP_INTERVAL);

    let state = AppState {
        hub,
        cfg: Arc::clone(&cfg),
        writer,
        metrics,
    };
    let app = http::router(state);

    let listener = TcpListener::bind(&cfg.addr)
        .await
        .with_context(|| format!("binding {}", cfg.addr))?;
    log::info!("listening on {}", cfg.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

/// Waits for `SIGINT` (ctrl-c everywhere) or `SIGTERM` (unix only). A full
/// connection drain on shutdown is not required: existing sessions keep
/// running until their individual pumps observe a transport failure.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let _ = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    log::info!("shutdown signal received; existing sessions will run until their pumps fail");
}
