//! Periodic lease usage reporting

use std::sync::Arc;
use std::time::Duration;

use overmesh_observability::MetricSender;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::authority::{LeaseController, Result};

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseUsage {
    /// Size of the block pool
    pub total: usize,
    /// Block pool entries not held by any stored lease
    pub free: usize,
    /// Stored leases past the expiration window
    pub stale: usize,
    /// Size of the single-IP pool
    pub single_ip_total: usize,
    /// Single-IP entries not held by any stored lease
    pub single_ip_free: usize,
}

impl LeaseUsage {
    /// Compute usage from the store
    ///
    /// Leases outside the pool do not reduce the free counts.
    pub async fn collect(controller: &LeaseController) -> Result<Self> {
        let pool = controller.pool();
        let all = controller.all_leases().await?;
        let active = controller.routable_leases().await?;

        let held_blocks = all
            .iter()
            .filter(|l| !l.is_single_ip() && pool.is_member(&l.overlay_subnet))
            .count();
        let held_singles = all
            .iter()
            .filter(|l| l.is_single_ip() && pool.is_member(&l.overlay_subnet))
            .count();

        Ok(Self {
            total: pool.block_pool_size(),
            free: pool.block_pool_size().saturating_sub(held_blocks),
            stale: all.len().saturating_sub(active.len()),
            single_ip_total: pool.single_pool_size(),
            single_ip_free: pool.single_pool_size().saturating_sub(held_singles),
        })
    }

    /// Publish the snapshot as gauges
    pub fn emit(&self, metrics: &dyn MetricSender) {
        metrics.send_value("totalLeases", self.total as f64, "leases");
        metrics.send_value("freeLeases", self.free as f64, "leases");
        metrics.send_value("staleLeases", self.stale as f64, "leases");
        metrics.send_value("singleIpLeasesTotal", self.single_ip_total as f64, "leases");
        metrics.send_value("singleIpLeasesFree", self.single_ip_free as f64, "leases");
    }
}

/// Emits [`LeaseUsage`] on a fixed interval until shut down
pub struct UsageReporter {
    controller: Arc<LeaseController>,
    metrics: Arc<dyn MetricSender>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl UsageReporter {
    pub fn new(
        controller: Arc<LeaseController>,
        metrics: Arc<dyn MetricSender>,
        interval: Duration,
    ) -> Self {
        Self {
            controller,
            metrics,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Collect and emit once; errors are logged and skipped
    pub async fn report_once(&self) {
        match LeaseUsage::collect(&self.controller).await {
            Ok(usage) => {
                debug!(?usage, "Lease usage");
                usage.emit(self.metrics.as_ref());
            }
            Err(e) => warn!(error = %e, "Failed to collect lease usage"),
        }
    }

    /// Run the reporting loop
    pub async fn run_loop(&self) {
        let mut interval = tokio::time::interval(self.interval);

        info!(interval_secs = self.interval.as_secs(), "Lease usage reporter started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.report_once().await;
                }
                _ = self.shutdown.notified() => {
                    break;
                }
            }
        }

        info!("Lease usage reporter stopped");
    }

    /// Signal the loop to stop
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
