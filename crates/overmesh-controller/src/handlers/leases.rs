//! Lease endpoints

use std::sync::Arc;

use axum::{extract::State, Json};
use overmesh_lease::Lease;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::authority::LeaseController;
use crate::error::{ApiError, Result};

/// State for lease handlers
#[derive(Clone)]
pub struct LeaseApiState {
    pub controller: Arc<LeaseController>,
}

impl LeaseApiState {
    pub fn new(controller: Arc<LeaseController>) -> Self {
        Self { controller }
    }
}

/// Acquire request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AcquireRequest {
    /// Requesting host's underlay IPv4 address
    pub underlay_ip: String,
    /// Request a single overlay address instead of a block
    #[serde(default)]
    pub single_overlay_ip: bool,
}

/// Release request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReleaseRequest {
    /// Underlay IPv4 address whose lease is dropped
    pub underlay_ip: String,
}

/// Routable lease list
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LeasesResponse {
    pub leases: Vec<Lease>,
}

/// Empty success body
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct EmptyResponse {}

/// List leases renewed within the expiration window
#[utoipa::path(
    get,
    path = "/leases",
    responses(
        (status = 200, description = "Routable leases", body = LeasesResponse),
        (status = 500, description = "Storage failure", body = crate::error::ErrorResponse),
    ),
    tag = "Leases"
)]
pub async fn list_leases(State(state): State<LeaseApiState>) -> Result<Json<LeasesResponse>> {
    let leases = state.controller.routable_leases().await?;
    debug!(count = leases.len(), "Listing routable leases");
    Ok(Json(LeasesResponse { leases }))
}

/// Acquire or re-fetch the lease for an underlay IP
#[utoipa::path(
    put,
    path = "/leases/acquire",
    request_body = AcquireRequest,
    responses(
        (status = 200, description = "Lease held by the host", body = Lease),
        (status = 400, description = "Invalid underlay IP", body = crate::error::ErrorResponse),
        (status = 503, description = "No lease available", body = crate::error::ErrorResponse),
        (status = 500, description = "Storage failure", body = crate::error::ErrorResponse),
    ),
    tag = "Leases"
)]
pub async fn acquire_lease(
    State(state): State<LeaseApiState>,
    Json(request): Json<AcquireRequest>,
) -> Result<Json<Lease>> {
    let lease = state
        .controller
        .acquire_subnet_lease(&request.underlay_ip, request.single_overlay_ip)
        .await?;
    Ok(Json(lease))
}

/// Renew a held lease
///
/// Every non-retriable failure, invalid leases included, answers 409 so the
/// daemon can tell it must re-acquire.
#[utoipa::path(
    put,
    path = "/leases/renew",
    request_body = Lease,
    responses(
        (status = 200, description = "Lease renewed", body = EmptyResponse),
        (status = 409, description = "Lease mismatch or invalid lease", body = crate::error::ErrorResponse),
        (status = 500, description = "Storage failure", body = crate::error::ErrorResponse),
    ),
    tag = "Leases"
)]
pub async fn renew_lease(
    State(state): State<LeaseApiState>,
    Json(lease): Json<Lease>,
) -> Result<Json<EmptyResponse>> {
    state
        .controller
        .renew_subnet_lease(&lease)
        .await
        .map_err(|e| {
            if e.kind().is_non_retriable() {
                ApiError::Conflict(e.to_string())
            } else {
                ApiError::from(e)
            }
        })?;
    Ok(Json(EmptyResponse {}))
}

/// Release the lease of an underlay IP
#[utoipa::path(
    put,
    path = "/leases/release",
    request_body = ReleaseRequest,
    responses(
        (status = 200, description = "Lease released (or never existed)", body = EmptyResponse),
        (status = 400, description = "Invalid underlay IP", body = crate::error::ErrorResponse),
        (status = 500, description = "Storage failure", body = crate::error::ErrorResponse),
    ),
    tag = "Leases"
)]
pub async fn release_lease(
    State(state): State<LeaseApiState>,
    Json(request): Json<ReleaseRequest>,
) -> Result<Json<EmptyResponse>> {
    state
        .controller
        .release_subnet_lease(&request.underlay_ip)
        .await?;
    Ok(Json(EmptyResponse {}))
}
