//! Per-host daemon lifecycle
//!
//! bind health -> discover lease -> serve health -> poll until shutdown or fatal -> optionally release

use std::future::Future;
use std::sync::Arc;

use overmesh_observability::PrometheusMetricSender;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::client::ControllerClient;
use crate::config::DaemonConfig;
use crate::converger::RouteConverger;
use crate::discovery::discover_lease;
use crate::error::{AgentError, Result};
use crate::fatal::FatalErrorDetector;
use crate::health::serve_health;
use crate::planner::ConvergencePlanner;
use crate::poller::Poller;
use crate::routes::RoutingAdapter;
use crate::state::LeaseState;
use crate::vtep::VtepConfig;

/// The assembled daemon
pub struct Daemon {
    config: DaemonConfig,
    client: Arc<dyn ControllerClient>,
    routes: Arc<dyn RoutingAdapter>,
    metrics: Arc<PrometheusMetricSender>,
}

impl Daemon {
    pub fn new(
        config: DaemonConfig,
        client: Arc<dyn ControllerClient>,
        routes: Arc<dyn RoutingAdapter>,
        metrics: Arc<PrometheusMetricSender>,
    ) -> Self {
        Self {
            config,
            client,
            routes,
            metrics,
        }
    }

    /// Run until `shutdown` resolves or a cycle turns fatal
    ///
    /// The health listener is bound before the controller is contacted, so an
    /// unusable address fails the daemon without acquiring a lease. A fatal
    /// exit returns the error and never releases the lease. If the health
    /// server dies, polling stops and its error is returned.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.health_listen_addr).await?;

        let state = LeaseState::new(&self.config.data_dir);
        let lease = discover_lease(
            self.client.as_ref(),
            &state,
            &self.config.underlay_ip,
            self.config.single_ip_only,
        )
        .await?;

        let vtep = VtepConfig::from_lease(
            &lease,
            self.config.vtep_name.clone(),
            self.config.vni,
            self.config.mtu,
        )?;
        info!(
            device = %vtep.device_name,
            overlay_ip = %vtep.overlay_ip,
            hardware_addr = %vtep.hardware_addr,
            vni = vtep.vni,
            mtu = vtep.mtu,
            "VTEP configuration"
        );

        let health_stop = Arc::new(Notify::new());
        let health_down = Arc::new(Notify::new());
        let health_task = tokio::spawn({
            let lease = Arc::new(lease.clone());
            let metrics = self.metrics.clone();
            let stop = health_stop.clone();
            let down = health_down.clone();
            async move {
                let result =
                    serve_health(listener, lease, metrics, async move { stop.notified().await })
                        .await;
                down.notify_one();
                result
            }
        });

        let planner = ConvergencePlanner::new(
            lease.clone(),
            self.client.clone(),
            RouteConverger::new(self.routes.clone(), vtep),
            FatalErrorDetector::new(self.config.partition_tolerance()),
            self.metrics.clone(),
        );
        let stop_polling = async move {
            tokio::select! {
                _ = shutdown => {}
                _ = health_down.notified() => warn!("Health server stopped, ending poll loop"),
            }
        };
        let result = Poller::new(planner, self.config.poll_interval())
            .run(stop_polling)
            .await;

        health_stop.notify_one();
        let health = health_task.await;

        result?;
        match health {
            Ok(served) => served?,
            Err(e) => return Err(AgentError::HealthServer(e.to_string())),
        }

        if self.config.release_on_shutdown {
            match self.client.release_subnet_lease(&lease.underlay_ip).await {
                Ok(()) => {
                    info!(underlay_ip = %lease.underlay_ip, "Released lease on shutdown");
                    state.remove().await?;
                }
                Err(e) => warn!(error = %e, "Failed to release lease on shutdown"),
            }
        }

        Ok(())
    }
}
