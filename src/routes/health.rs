use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "IPTV Aggregator",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// Catalog stats
#[derive(Serialize)]
struct CatalogStats {
    channels: usize,
    groups: usize,
    subscriptions: usize,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: u64,
    catalog: CatalogStats,
    check_running: bool,
    update_running: bool,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (channels, groups) = {
        let catalog = state.catalog.read().await;
        (catalog.len(), catalog.groups().len())
    };

    Json(HealthResponse {
        status: "ok",
        uptime: state.start_time.elapsed().as_secs(),
        catalog: CatalogStats {
            channels,
            groups,
            subscriptions: state.subscriptions.list().await.len(),
        },
        check_running: state.checker.is_running(),
        update_running: state.pipeline.is_running(),
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Internal Server Error".to_vec(),
            )
        }
    }
}

/// Liveness probe
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
