//! One renew-fetch-converge cycle

use std::sync::Arc;

use overmesh_lease::Lease;
use overmesh_observability::MetricSender;
use tracing::{debug, warn};

use crate::client::ControllerClient;
use crate::converger::RouteConverger;
use crate::error::PlannerError;
use crate::fatal::FatalErrorDetector;

/// Drives the local lease and routes towards the controller's view
pub struct ConvergencePlanner {
    lease: Lease,
    client: Arc<dyn ControllerClient>,
    converger: RouteConverger,
    detector: FatalErrorDetector,
    metrics: Arc<dyn MetricSender>,
}

impl ConvergencePlanner {
    pub fn new(
        lease: Lease,
        client: Arc<dyn ControllerClient>,
        converger: RouteConverger,
        detector: FatalErrorDetector,
        metrics: Arc<dyn MetricSender>,
    ) -> Self {
        Self {
            lease,
            client,
            converger,
            detector,
            metrics,
        }
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Renew the local lease, then converge routes to every active lease
    ///
    /// Only a renewal failure can be fatal. Listing and convergence failures
    /// abort the cycle and are retried on the next tick.
    pub async fn do_cycle(&mut self) -> Result<(), PlannerError> {
        if let Err(e) = self.client.renew_subnet_lease(&self.lease).await {
            self.metrics.increment_counter("renewFailure");
            if self.detector.is_fatal(&e) {
                return Err(PlannerError::Fatal(e));
            }
            return Err(PlannerError::Renew(e));
        }
        self.detector.got_success();
        self.metrics.increment_counter("renewSuccess");

        let leases = self
            .client
            .get_active_leases()
            .await
            .map_err(PlannerError::FetchLeases)?;

        self.metrics
            .send_value("numberLeases", leases.len() as f64, "leases");

        match self.converger.converge(&leases).await {
            Ok(()) => {
                self.metrics.increment_counter("convergeSuccess");
                debug!(leases = leases.len(), "Cycle complete");
                Ok(())
            }
            Err(e) => {
                self.metrics.increment_counter("convergeFailure");
                warn!(error = %e, "Route convergence failed");
                Err(e.into())
            }
        }
    }
}
