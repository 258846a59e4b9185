//! Reconciles the routing table with the active lease set

use std::collections::HashSet;
use std::sync::Arc;

use ipnet::Ipv4Net;
use overmesh_lease::Lease;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::ConvergeError;
use crate::routes::{Route, RoutingAdapter};
use crate::vtep::VtepConfig;

/// Installs one route per remote lease through the local VTEP
///
/// Destinations installed by this converger are remembered; once a subnet
/// drops out of the active set its route is deleted. Routes left behind by an
/// earlier process are not known and stay until replaced.
pub struct RouteConverger {
    adapter: Arc<dyn RoutingAdapter>,
    vtep: VtepConfig,
    installed: Mutex<HashSet<Ipv4Net>>,
}

impl RouteConverger {
    pub fn new(adapter: Arc<dyn RoutingAdapter>, vtep: VtepConfig) -> Self {
        Self {
            adapter,
            vtep,
            installed: Mutex::new(HashSet::new()),
        }
    }

    pub fn vtep(&self) -> &VtepConfig {
        &self.vtep
    }

    /// Destinations currently routed by this converger
    pub fn installed(&self) -> HashSet<Ipv4Net> {
        self.installed.lock().clone()
    }

    /// Route to `destination` via the peer VTEP at its network address
    pub fn route_for(&self, destination: Ipv4Net) -> Route {
        Route {
            destination,
            gateway: destination.network(),
            device: self.vtep.device_name.clone(),
            source: self.vtep.overlay_ip,
        }
    }

    /// Replace routes for every lease except our own, then delete routes to
    /// subnets no longer leased
    ///
    /// Stops at the first unparsable subnet or routing failure. Stale routes
    /// are only deleted after every replacement succeeded.
    pub async fn converge(&self, leases: &[Lease]) -> Result<(), ConvergeError> {
        let mut wanted = HashSet::new();

        for lease in leases {
            let destination: Ipv4Net = lease.overlay_subnet.parse().map_err(|_| {
                ConvergeError::InvalidSubnet {
                    underlay_ip: lease.underlay_ip.clone(),
                    subnet: lease.overlay_subnet.clone(),
                }
            })?;

            if destination == self.vtep.local_subnet {
                continue;
            }

            let route = self.route_for(destination);
            self.adapter
                .replace_route(&route)
                .await
                .map_err(|source| ConvergeError::Route {
                    destination: destination.to_string(),
                    source,
                })?;
            self.installed.lock().insert(destination);
            wanted.insert(destination);
        }

        let stale: Vec<Ipv4Net> = self
            .installed
            .lock()
            .difference(&wanted)
            .copied()
            .collect();
        for destination in &stale {
            self.adapter
                .delete_route(&self.route_for(*destination))
                .await
                .map_err(|source| ConvergeError::StaleRoute {
                    destination: destination.to_string(),
                    source,
                })?;
            self.installed.lock().remove(destination);
            info!(%destination, "Deleted route to expired subnet");
        }

        debug!(
            leases = leases.len(),
            routes = wanted.len(),
            deleted = stale.len(),
            "Converged routes"
        );
        Ok(())
    }
}
