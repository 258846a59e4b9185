//! Local HTTP endpoint: the host's lease and the daemon's metrics

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use overmesh_lease::Lease;
use overmesh_observability::PrometheusMetricSender;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by the local handlers
#[derive(Clone)]
pub struct HealthState {
    pub lease: Arc<Lease>,
    pub metrics: Arc<PrometheusMetricSender>,
}

/// Current lease of this host
pub async fn health(State(state): State<HealthState>) -> Json<Lease> {
    Json(state.lease.as_ref().clone())
}

/// Renew and convergence metrics in Prometheus text format
pub async fn metrics(State(state): State<HealthState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn build_health_router(lease: Arc<Lease>, metrics: Arc<PrometheusMetricSender>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(self::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(HealthState { lease, metrics })
}

/// Serve the local router on `listener` until `shutdown` resolves
pub async fn serve_health(
    listener: TcpListener,
    lease: Arc<Lease>,
    metrics: Arc<PrometheusMetricSender>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(bind = %addr, "Starting health server");
    }

    axum::serve(listener, build_health_router(lease, metrics))
        .with_graceful_shutdown(shutdown)
        .await
}
