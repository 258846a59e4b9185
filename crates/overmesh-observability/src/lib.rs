//! Overmesh Observability - Logging and Metrics
//!
//! - Structured logging with JSON/pretty formats and optional rolling files
//! - A small [`MetricSender`] abstraction backed by Prometheus
//!
//! # Quick Start
//!
//! ```no_run
//! use overmesh_observability::{init_observability, ObservabilityConfig};
//!
//! let config = ObservabilityConfig::default();
//! let (_guard, metrics) = init_observability(&config).expect("Failed to init observability");
//!
//! tracing::info!("Application started");
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

use std::sync::Arc;

pub use config::*;
pub use error::{ObservabilityError, Result};
pub use logging::{init_logging, LogGuard};
pub use metrics::{InMemoryMetricSender, MetricSender, NoopMetricSender, PrometheusMetricSender};

/// Initialize logging and create the process-wide metric sender
///
/// The returned guard must be held for the lifetime of the application.
pub fn init_observability(
    config: &ObservabilityConfig,
) -> Result<(LogGuard, Arc<PrometheusMetricSender>)> {
    let guard = init_logging(&config.logging)?;
    let metrics = Arc::new(PrometheusMetricSender::new(&config.metrics));

    tracing::info!(
        metrics_enabled = config.metrics.enabled,
        "Observability initialized"
    );

    Ok((guard, metrics))
}
