use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use tracing_subscriber::EnvFilter;

/// Installs a compact `fmt` subscriber. `RUST_LOG` wins over the configured level.
///
/// The library itself never calls this; binaries and embedding services do.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::EnvFilter {
            value: config.log_level.clone(),
            source,
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}
