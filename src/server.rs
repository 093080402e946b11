//! HTTP surface of the exporter.
//!
//! `/metrics` runs a full scrape against the gateway on every request; the
//! other routes never touch the device unless the session has lapsed.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use tokio::signal;
use tracing::{error, info};

use crate::readiness_probe::ReadinessProbe;
use crate::scrape_coordinator::ScrapeCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ScrapeCoordinator>,
    pub probe: ReadinessProbe,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Enphase Exporter</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        a { color: #3498db; text-decoration: none; }
        .endpoint { margin: 10px 0; }
    </style>
</head>
<body>
    <h1>Enphase Exporter</h1>
    <p>Prometheus exporter for Enphase IQ Gateway production, consumption, meter and inverter data.</p>
    <div class="endpoint"><a href="/metrics">/metrics</a> - Prometheus metrics</div>
    <div class="endpoint"><a href="/health">/health</a> - Liveness check</div>
    <div class="endpoint"><a href="/ready">/ready</a> - Gateway session readiness</div>
</body>
</html>"#,
    )
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.coordinator.render().await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode metrics: {e}"))
                .into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_handler(State(state): State<AppState>) -> Response {
    match state.probe.check().await {
        Ok(()) => (StatusCode::OK, "Ready").into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("Not Ready: {e}")).into_response(),
    }
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
