//! Vigil HTTP/WebSocket transport adapter
//!
//! A thin axum surface over the ingest coordinator: REST routes for
//! analysis, stats, history and configuration, plus a WebSocket stream of
//! detector results.

pub mod error;
pub mod rest;
pub mod websocket;

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use vigil_ingest::IngestCoordinator;
use vigil_observability::PrometheusHandle;

/// Shared state handed to every handler
pub struct ApiState {
    pub coordinator: Arc<IngestCoordinator>,
    pub metrics: PrometheusHandle,
}

/// Build the full application router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/analyze", post(rest::analyze))
        .route("/stats", get(rest::stats))
        .route("/history", get(rest::history))
        .route("/anomalies", get(rest::anomalies))
        .route("/config", get(rest::get_config).put(rest::put_config))
        .route("/reset", post(rest::reset))
        .route("/health", get(rest::health))
        .route("/auto-report/status", get(rest::auto_report_status))
        .route("/auto-report/config", put(rest::put_auto_report_config))
        .route(
            "/auto-report/clear-buffer",
            post(rest::clear_auto_report_buffer),
        )
        .route("/metrics", get(rest::metrics))
        .route("/ws", get(websocket::ws_handler))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
