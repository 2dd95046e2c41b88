//! Minimal liveness endpoint, bound separately from the job pipeline's own work so an
//! orchestrator (systemd, Kubernetes) has something to poll regardless of queue depth.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use revaer_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Serve `GET /healthz` and `GET /metrics` on `bind_addr` until `cancel` fires.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run(bind_addr: SocketAddr, cancel: CancellationToken, metrics: Metrics) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(render_metrics))
        .with_state(metrics);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "health endpoint listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    warn!("health endpoint stopped");
    Ok(())
}

async fn render_metrics(State(metrics): State<Metrics>) -> Result<String, StatusCode> {
    metrics.render().map_err(|err| {
        warn!(error = %err, "failed to render metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
