//! Periodic driver for the convergence planner

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::PlannerError;
use crate::planner::ConvergencePlanner;

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Runs one planner cycle per tick until shut down or a cycle is fatal
pub struct Poller {
    planner: ConvergencePlanner,
    interval: Duration,
}

impl Poller {
    pub fn new(planner: ConvergencePlanner, interval: Duration) -> Self {
        Self { planner, interval }
    }

    /// Run until `shutdown` resolves (Ok) or a fatal cycle (Err)
    ///
    /// The first cycle runs immediately. A cycle in progress always completes;
    /// shutdown is only observed while waiting for the next tick.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), PlannerError>
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), "Poller started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Poller received shutdown signal");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }

            match self.planner.do_cycle().await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Fatal error, stopping poller");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Cycle failed, retrying next tick"),
            }
        }
    }
}
