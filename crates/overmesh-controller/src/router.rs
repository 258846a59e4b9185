//! API router construction

use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};
use overmesh_observability::PrometheusMetricSender;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::authority::LeaseController;
use crate::handlers;
use crate::handlers::leases::LeaseApiState;
use crate::handlers::metrics::MetricsState;
use crate::openapi::ApiDoc;

/// Build the controller router
pub fn build_router(
    controller: Arc<LeaseController>,
    metrics: Arc<PrometheusMetricSender>,
    swagger_enabled: bool,
) -> Router {
    let lease_state = LeaseApiState::new(controller);

    let lease_routes = Router::new()
        .route("/leases", get(handlers::leases::list_leases))
        .route("/leases/acquire", put(handlers::leases::acquire_lease))
        .route("/leases/renew", put(handlers::leases::renew_lease))
        .route("/leases/release", put(handlers::leases::release_lease))
        .with_state(lease_state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics::metrics))
        .with_state(MetricsState { metrics });

    let mut router = Router::new()
        .route("/health", get(handlers::health::health))
        .merge(lease_routes)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http());

    if swagger_enabled {
        router = router
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    router
}
