use crate::config::{CommonConfig, MetricsConfig};
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const METRICS_PREFIX: &str = "route_relay";
/// Used when `RUST_LOG` is unset. Keeps the per-call upstream line visible.
const DEFAULT_LOG_FILTER: &str = "info,relay=debug";

#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("could not build statsd recorder: {0}")]
    Statsd(#[from] StatsdError),
    #[error("invalid sentry DSN: {0}")]
    SentryDsn(#[from] sentry::types::ParseDsnError),
    #[error("a metrics recorder is already installed")]
    RecorderAlreadySet,
}

/// Keeps the sentry client alive; events are flushed when dropped.
pub struct ObservabilityGuard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Installs logging, sentry and metrics according to the common config.
///
/// Must run before the tokio runtime starts so sentry can hook into it.
pub fn init(config: &CommonConfig) -> Result<ObservabilityGuard, ObservabilityError> {
    let sentry_guard = match &config.logging {
        Some(logging) => {
            let dsn = logging.sentry_dsn.parse::<sentry::types::Dsn>()?;
            Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            }))
        }
        None => None,
    };

    let sentry_layer = sentry_guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(default_env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    if let Some(metrics_config) = &config.metrics {
        init_metrics(metrics_config)?;
        tracing::info!(
            host = %metrics_config.statsd_host,
            port = metrics_config.statsd_port,
            "Sending metrics to statsd"
        );
    }

    Ok(ObservabilityGuard {
        _sentry: sentry_guard,
    })
}

fn default_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_metrics(config: &MetricsConfig) -> Result<(), ObservabilityError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))?;
    metrics::set_global_recorder(recorder).map_err(|_| ObservabilityError::RecorderAlreadySet)?;
    shared::metrics_defs::describe_all(relay::metrics_defs::ALL_METRICS);

    Ok(())
}
