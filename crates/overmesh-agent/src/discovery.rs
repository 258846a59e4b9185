//! Startup lease discovery

use overmesh_lease::{validate, Lease};
use tracing::{info, warn};

use crate::client::ControllerClient;
use crate::error::Result;
use crate::state::LeaseState;

/// Find the lease this host should run with
///
/// A persisted lease for the same underlay IP and granularity is renewed and
/// kept. If the controller rejects it, or nothing usable was persisted, a
/// fresh lease is acquired and persisted. Transient renew failures are
/// returned as-is.
pub async fn discover_lease(
    client: &dyn ControllerClient,
    state: &LeaseState,
    underlay_ip: &str,
    single_ip_only: bool,
) -> Result<Lease> {
    if let Some(persisted) = state.load().await? {
        if persisted.underlay_ip != underlay_ip {
            warn!(
                persisted = %persisted.underlay_ip,
                configured = %underlay_ip,
                "Persisted lease belongs to another underlay ip, ignoring it"
            );
        } else if persisted.is_single_ip() != single_ip_only {
            warn!(
                subnet = %persisted.overlay_subnet,
                single_ip_only,
                "Persisted lease has the wrong granularity, ignoring it"
            );
        } else {
            match client.renew_subnet_lease(&persisted).await {
                Ok(()) => {
                    info!(
                        underlay_ip = %underlay_ip,
                        subnet = %persisted.overlay_subnet,
                        "Renewed persisted lease"
                    );
                    return Ok(persisted);
                }
                Err(e) if e.kind().is_non_retriable() => {
                    warn!(error = %e, "Persisted lease rejected, acquiring a new one");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let lease = client
        .acquire_subnet_lease(underlay_ip, single_ip_only)
        .await?;
    validate(&lease)?;
    state.save(&lease).await?;

    info!(
        underlay_ip = %lease.underlay_ip,
        subnet = %lease.overlay_subnet,
        "Acquired lease"
    );
    Ok(lease)
}
