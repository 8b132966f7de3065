use crate::config::{LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const METRICS_PREFIX: &str = "appbridge";

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("invalid log level {level:?}: {message}")]
    LogLevel { level: String, message: String },
    #[error("could not install logger: {0}")]
    Logger(String),
    #[error("could not install metrics recorder: {0}")]
    Metrics(String),
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. The returned guard flushes Sentry on drop.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<Option<sentry::ClientInitGuard>, SetupError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| SetupError::LogLevel {
            level: config.level.clone(),
            message: e.to_string(),
        })?,
    };

    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(sentry_layer)
        .try_init()
        .map_err(|e| SetupError::Logger(e.to_string()))?;

    Ok(guard)
}

/// Exports metrics to statsd when configured; otherwise metric calls are no-ops.
pub fn init_metrics(config: Option<&MetricsConfig>) -> Result<(), SetupError> {
    let Some(config) = config else {
        tracing::debug!("No metrics backend configured");
        return Ok(());
    };

    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| SetupError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| SetupError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(webhook_receiver::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(record_fetcher::metrics_defs::ALL_METRICS);

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Exporting metrics to statsd"
    );
    Ok(())
}
