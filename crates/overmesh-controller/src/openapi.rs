//! OpenAPI document

use overmesh_lease::Lease;
use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers;
use crate::handlers::health::HealthResponse;
use crate::handlers::leases::{AcquireRequest, EmptyResponse, LeasesResponse, ReleaseRequest};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Overmesh Controller API",
        description = "Overlay subnet lease authority"
    ),
    paths(
        handlers::health::health,
        handlers::leases::list_leases,
        handlers::leases::acquire_lease,
        handlers::leases::renew_lease,
        handlers::leases::release_lease,
        handlers::metrics::metrics,
    ),
    components(schemas(
        Lease,
        AcquireRequest,
        ReleaseRequest,
        LeasesResponse,
        EmptyResponse,
        HealthResponse,
        ErrorResponse,
    )),
    tags(
        (name = "Leases", description = "Subnet lease lifecycle"),
        (name = "Health", description = "Liveness"),
        (name = "Metrics", description = "Prometheus exposition"),
    )
)]
pub struct ApiDoc;
