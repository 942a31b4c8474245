//! Manual soak-testing tool: dials many concurrent WebSocket clients
//! against a running geobeacon-hub and drives synthetic movement.
//!
//! Out of the concurrency core's contract (see the crate's module docs);
//! shipped as a second binary because the reference implementation ships
//! one too.

use std::f64::consts::PI;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::SinkExt;
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug, Clone)]
#[command(name = "geobeacon-loadtest", about = "Soak-test a geobeacon-hub server")]
struct Args {
    /// WebSocket URL, without the `userId` query parameter.
    #[arg(long, default_value = "ws://localhost:8080/ws")]
    url: String,
    /// Number of concurrent simulated clients.
    #[arg(long, default_value_t = 200)]
    clients: usize,
    /// Send interval per client, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    interval: u64,
    /// Center latitude for the simulated client cluster.
    #[arg(long, default_value_t = 35.6892)]
    lat: f64,
    /// Center longitude for the simulated client cluster.
    #[arg(long, default_value_t = 51.3890)]
    lng: f64,
    /// Spread, in degrees, around the center point (~0.02 is a few km).
    #[arg(long, default_value_t = 0.02)]
    spread: f64,
}

#[derive(Serialize)]
struct LocationMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "userId")]
    user_id: String,
    lat: f64,
    lng: f64,
    accuracy: f64,
    ts: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    log::info!(
        "starting loadgen: clients={} interval={}ms",
        args.clients,
        args.interval
    );
    log::info!(
        "center: lat={:.6} lng={:.6} spread={:.4}",
        args.lat,
        args.lng,
        args.spread
    );

    let (stop_tx, stop_rx) = watch::channel(false);

    let mut tasks = Vec::with_capacity(args.clients);
    for i in 0..args.clients {
        let user_id = format!("loadtest-{i}");
        let mut rng = rand::rng();
        let start_lat = args.lat + (rng.random::<f64>() * 2.0 - 1.0) * args.spread;
        let start_lng = args.lng + (rng.random::<f64>() * 2.0 - 1.0) * args.spread;
        let url = format!("{}?userId={}", args.url, user_id);
        let interval = Duration::from_millis(args.interval);
        let mut stop_rx = stop_rx.clone();

        tasks.push(tokio::spawn(async move {
            run_client(url, user_id, start_lat, start_lng, interval, &mut stop_rx).await;
        }));
    }

    tokio::signal::ctrl_c().await.ok();
    log::info!("stopping loadgen...");
    let _ = stop_tx.send(true);

    for task in tasks {
        let _ = task.await;
    }
    log::info!("all clients stopped.");

    Ok(())
}

/// Drive one simulated client: connect, then emit a slowly-wandering
/// position on every tick until told to stop, reconnecting on write
/// failure with a short backoff.
async fn run_client(
    url: String,
    user_id: String,
    start_lat: f64,
    start_lng: f64,
    interval: Duration,
    stop_rx: &mut watch::Receiver<bool>,
) {
    let mut lat = start_lat;
    let mut lng = start_lng;
    let mut rng = rand::rng();
    let step = 0.0002 + rng.random::<f64>() * 0.0003;
    let mut angle = rng.random::<f64>() * 2.0 * PI;

    let mut conn = match connect(&url).await {
        Ok(c) => c,
        Err(err) => {
            log::warn!("[{user_id}] dial error: {err}");
            return;
        }
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    let _ = conn.send(Message::Close(None)).await;
                    return;
                }
            }
            _ = ticker.tick() => {
                angle += (rng.random::<f64>() * 2.0 - 1.0) * 0.05;
                lat += angle.sin() * step;
                lng += angle.cos() * step;

                let msg = LocationMessage {
                    kind: "location",
                    user_id: user_id.clone(),
                    lat,
                    lng,
                    accuracy: 5.0 + rng.random::<f64>() * 5.0,
                    ts: now_unix(),
                };
                let Ok(payload) = serde_json::to_string(&msg) else { continue };

                if let Err(err) = conn.send(Message::Text(payload)).await {
                    log::warn!("[{user_id}] write error: {err} (reconnecting)");
                    match reconnect(&url, stop_rx).await {
                        Some(c) => conn = c,
                        None => return,
                    }
                }
            }
        }
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(url: &str) -> Result<WsStream> {
    let (stream, _response) = tokio::time::timeout(
        Duration::from_secs(5),
        tokio_tungstenite::connect_async(url),
    )
    .await
    .context("handshake timed out")?
    .context("websocket connect failed")?;
    Ok(stream)
}

/// Retry `connect` with a short fixed backoff until it succeeds or a stop
/// signal arrives.
async fn reconnect(url: &str, stop_rx: &mut watch::Receiver<bool>) -> Option<WsStream> {
    loop {
        if *stop_rx.borrow() {
            return None;
        }
        if let Ok(conn) = connect(url).await {
            return Some(conn);
        }
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    return None;
                }
            }
            () = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
