//! Metric emission and Prometheus exposition
//!
//! Components report through the [`MetricSender`] trait; they never touch
//! Prometheus types directly. Metric names are camelCase (e.g. `renewFailure`)
//! and are registered lazily on first use.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};
use tracing::warn;

use crate::config::MetricsConfig;
use crate::error::{ObservabilityError, Result};

/// Fire-and-forget metric sink
pub trait MetricSender: Send + Sync {
    /// Set a gauge to `value`
    fn send_value(&self, name: &str, value: f64, unit: &str);

    /// Increment a counter by one
    fn increment_counter(&self, name: &str);
}

/// Prometheus-backed metric sender
pub struct PrometheusMetricSender {
    registry: Registry,
    namespace: String,
    enabled: bool,
    gauges: Mutex<HashMap<String, Gauge>>,
    counters: Mutex<HashMap<String, Counter>>,
}

impl PrometheusMetricSender {
    /// Create a sender with its own registry
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            registry: Registry::new(),
            namespace: config.namespace.clone(),
            enabled: config.enabled,
            gauges: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode all registered metrics in Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| ObservabilityError::MetricsEncode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| ObservabilityError::MetricsEncode(e.to_string()))
    }

    fn opts(&self, name: &str, help: String) -> Opts {
        let opts = Opts::new(name, help);
        if self.namespace.is_empty() {
            opts
        } else {
            opts.namespace(self.namespace.clone())
        }
    }

    fn gauge(&self, name: &str, unit: &str) -> Result<Gauge> {
        let mut gauges = self.gauges.lock();
        if let Some(gauge) = gauges.get(name) {
            return Ok(gauge.clone());
        }

        let help = if unit.is_empty() {
            name.to_string()
        } else {
            format!("{} ({})", name, unit)
        };
        let gauge = Gauge::with_opts(self.opts(name, help))
            .map_err(|e| ObservabilityError::MetricsInit(e.to_string()))?;
        self.registry
            .register(Box::new(gauge.clone()))
            .map_err(|e| ObservabilityError::MetricsInit(e.to_string()))?;
        gauges.insert(name.to_string(), gauge.clone());
        Ok(gauge)
    }

    fn counter(&self, name: &str) -> Result<Counter> {
        let mut counters = self.counters.lock();
        if let Some(counter) = counters.get(name) {
            return Ok(counter.clone());
        }

        let counter = Counter::with_opts(self.opts(name, name.to_string()))
            .map_err(|e| ObservabilityError::MetricsInit(e.to_string()))?;
        self.registry
            .register(Box::new(counter.clone()))
            .map_err(|e| ObservabilityError::MetricsInit(e.to_string()))?;
        counters.insert(name.to_string(), counter.clone());
        Ok(counter)
    }
}

impl MetricSender for PrometheusMetricSender {
    fn send_value(&self, name: &str, value: f64, unit: &str) {
        if !self.enabled {
            return;
        }
        match self.gauge(name, unit) {
            Ok(gauge) => gauge.set(value),
            Err(e) => warn!(metric = name, error = %e, "Failed to record gauge"),
        }
    }

    fn increment_counter(&self, name: &str) {
        if !self.enabled {
            return;
        }
        match self.counter(name) {
            Ok(counter) => counter.inc(),
            Err(e) => warn!(metric = name, error = %e, "Failed to increment counter"),
        }
    }
}

/// Metric sender that keeps the latest values in memory
///
/// Useful for tests and for inspecting what a component reported.
#[derive(Debug, Default)]
pub struct InMemoryMetricSender {
    values: Mutex<HashMap<String, f64>>,
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryMetricSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value sent for a gauge
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.lock().get(name).copied()
    }

    /// Current counter value (0 if never incremented)
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }
}

impl MetricSender for InMemoryMetricSender {
    fn send_value(&self, name: &str, value: f64, _unit: &str) {
        self.values.lock().insert(name.to_string(), value);
    }

    fn increment_counter(&self, name: &str) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += 1;
    }
}

/// Metric sender that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricSender;

impl MetricSender for NoopMetricSender {
    fn send_value(&self, _name: &str, _value: f64, _unit: &str) {}

    fn increment_counter(&self, _name: &str) {}
}

impl<T: MetricSender + ?Sized> MetricSender for Arc<T> {
    fn send_value(&self, name: &str, value: f64, unit: &str) {
        (**self).send_value(name, value, unit)
    }

    fn increment_counter(&self, name: &str) {
        (**self).increment_counter(name)
    }
}
