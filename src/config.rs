use crate::error::ConfigError;
use std::env;
use std::num::NonZeroUsize;
use std::thread;

pub const POOL_SIZE_VAR: &str = "RISK_ENGINE_BATCH_POOL_SIZE";
pub const MAX_DB_RETRIES_VAR: &str = "RISK_ENGINE_BATCH_MAX_DB_RETRIES";
pub const PUBLICATION_RETRIES_VAR: &str = "RISK_ENGINE_PUBLICATION_MAX_RETRIES";
pub const LOG_LEVEL_VAR: &str = "RISK_ENGINE_LOG_LEVEL";

/// Runtime settings of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub batch: BatchConfig,
    pub publication: PublicationConfig,
    pub telemetry: TelemetryConfig,
}

/// Worker pool and retry settings for batch executions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub pool_size: usize,
    pub max_db_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationConfig {
    pub max_retries: u32,
}

/// Tracing controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig {
                pool_size: default_pool_size(),
                max_db_retries: 2,
            },
            publication: PublicationConfig { max_retries: 3 },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
            },
        }
    }
}

impl EngineConfig {
    /// Reads the configuration from the environment, after loading a `.env` file if one
    /// exists. Unset variables keep their defaults.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let pool_size = read_number(POOL_SIZE_VAR)?
            .map(|n| n.get())
            .unwrap_or(defaults.batch.pool_size);
        let max_db_retries = read_count(MAX_DB_RETRIES_VAR)?.unwrap_or(defaults.batch.max_db_retries);
        let max_retries =
            read_count(PUBLICATION_RETRIES_VAR)?.unwrap_or(defaults.publication.max_retries);
        let log_level = env::var(LOG_LEVEL_VAR).unwrap_or(defaults.telemetry.log_level);

        Ok(Self {
            batch: BatchConfig {
                pool_size,
                max_db_retries,
            },
            publication: PublicationConfig { max_retries },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

fn default_pool_size() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn read_number(key: &'static str) -> Result<Option<NonZeroUsize>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<NonZeroUsize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        Err(_) => Ok(None),
    }
}

fn read_count(key: &'static str) -> Result<Option<u32>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        Err(_) => Ok(None),
    }
}
