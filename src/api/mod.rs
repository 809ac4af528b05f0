//! HTTP transport for the remote-storage protocol.
//!
//! One write and one read endpoint (paths from configuration) speaking
//! snappy-compressed protobuf, plus `/metrics` for the adapter's own counters
//! and a `/health` probe.

pub mod metrics;
pub mod remote;

use crate::config::HttpServerConfig;
use crate::read::Reader;
use crate::write::Writer;
use metrics::Metrics;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Exposition format served on `/metrics`.
const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    pub writer: Arc<Writer>,
    pub reader: Arc<Reader>,
    pub metrics: Arc<Metrics>,
}

/// Build the HTTP router
pub fn build_router(state: AppState, http: &HttpServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route(&http.write_url, post(remote::handle_remote_write))
        .route(&http.read_url, post(remote::handle_remote_read))
        .route("/metrics", get(metrics_exposition))
        .with_state(state)
        .layer(cors)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Adapter self-metrics in OpenMetrics text exposition.
async fn metrics_exposition(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
        state.metrics.encode(),
    )
}
