//! Prometheus exposition endpoint

use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use overmesh_observability::PrometheusMetricSender;

use crate::error::ApiError;

/// State for the metrics handler
#[derive(Clone)]
pub struct MetricsState {
    pub metrics: Arc<PrometheusMetricSender>,
}

/// Render every registered metric in Prometheus text format
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Prometheus text exposition", body = String, content_type = "text/plain"),
    ),
    tag = "Metrics"
)]
pub async fn metrics(State(state): State<MetricsState>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .encode()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
