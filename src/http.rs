//! The upgrade handler and HTTP surface: the thin collaborator between a
//! raw TCP listener and the concurrency core. Its only contract with the
//! core is to hand over a validated user identity and a framed
//! bidirectional byte stream, read counters off [`Metrics`], and let the
//! store's own sweeper run independently.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::Config;
use crate::hub::{session, Hub};
use crate::metrics::Metrics;
use crate::transport::{AxumWsReader, AxumWsWriter};
use crate::writer::WriterPool;

/// Everything an HTTP handler needs to reach the concurrency core.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub cfg: Arc<Config>,
    pub writer: Arc<WriterPool>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// Build the Axum router: `/ws`, `/health`, `/metrics`, wrapped in a
/// panic-catching layer so an unwinding handler surfaces as a `500`
/// instead of taking the listener task down with it.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot(&state.writer.stats()))
}

async fn ws_handler(
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    let user_id = match query.user_id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => return (StatusCode::BAD_REQUEST, "missing userId").into_response(),
    };

    let max_message_bytes = state.cfg.max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = futures_util::StreamExt::split(socket);
            let reader: Box<dyn crate::transport::WsReader> = Box::new(AxumWsReader(stream));
            let writer_half: Box<dyn crate::transport::WsWriter> = Box::new(AxumWsWriter(sink));

            session::spawn(
                state.hub.clone(),
                Arc::clone(&state.cfg),
                Arc::clone(&state.writer),
                Arc::clone(&state.metrics),
                user_id,
                reader,
                writer_half,
            )
            .await;
        })
}
