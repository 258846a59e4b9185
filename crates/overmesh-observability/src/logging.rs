//! Structured logging with JSON/pretty output and file rotation

use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::{FileLoggingConfig, LogFormat, LoggingConfig, RotationStrategy};
use crate::error::{ObservabilityError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Guard that must be held to keep the async file writer running
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration
///
/// `RUST_LOG` takes precedence over the configured level and directives.
/// Returns a guard that must be held for the lifetime of the application
/// so buffered file output is flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| build_filter(config));

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config)];

    let guard = match &config.file {
        Some(file_config) => {
            let (layer, guard) = file_layer(config, file_config);
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| ObservabilityError::LoggingInit(e.to_string()))?;

    Ok(LogGuard { _guard: guard })
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    match &config.filter_directives {
        Some(directives) => EnvFilter::new(format!("{},{}", config.level.as_str(), directives)),
        None => EnvFilter::new(config.level.as_str()),
    }
}

fn console_layer(config: &LoggingConfig) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(io::stdout)
        .with_target(config.include_target);

    match config.format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

fn file_layer(config: &LoggingConfig, file_config: &FileLoggingConfig) -> (BoxedLayer, WorkerGuard) {
    let appender = match file_config.rotation {
        RotationStrategy::Daily => {
            tracing_appender::rolling::daily(&file_config.directory, &file_config.prefix)
        }
        RotationStrategy::Hourly => {
            tracing_appender::rolling::hourly(&file_config.directory, &file_config.prefix)
        }
        RotationStrategy::Never => {
            tracing_appender::rolling::never(&file_config.directory, &file_config.prefix)
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    // Files are always JSON so they can be shipped as-is
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(config.include_target)
        .with_ansi(false)
        .json()
        .boxed();

    (layer, guard)
}
