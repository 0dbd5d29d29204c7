//! Warden service configuration.
//!
//! Process configuration is loaded from environment variables. Handler
//! definitions live in a separate pipeline file, see
//! [`PipelineConfig`](crate::pipeline::factory::PipelineConfig).

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Default capacity of the rule-set change event queue.
pub const DEFAULT_RULE_EVENT_QUEUE_CAPACITY: usize = 64;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Warden service configuration.
#[derive(Clone)]
pub struct Config {
    /// Pipeline configuration file (handler definitions and default rule).
    pub pipeline_config_path: PathBuf,

    /// Rule-set files published once at start-up.
    pub rule_set_paths: Vec<PathBuf>,

    /// Capacity of the rule-set change event queue (default: 64).
    pub rule_event_queue_capacity: usize,

    /// Prometheus listener address. Metrics are not exported when unset.
    pub metrics_bind_address: Option<SocketAddr>,

    pub log_format: LogFormat,
}

/// Debug output redacts file paths.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("pipeline_config_path", &"[REDACTED]")
            .field("rule_set_paths", &self.rule_set_paths.len())
            .field("rule_event_queue_capacity", &self.rule_event_queue_capacity)
            .field("metrics_bind_address", &self.metrics_bind_address)
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid rule event queue capacity: {0}")]
    InvalidQueueCapacity(String),

    #[error("Invalid metrics bind address: {0}")]
    InvalidMetricsAddress(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let pipeline_config_path = vars
            .get("PIPELINE_CONFIG_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("PIPELINE_CONFIG_PATH".to_string()))?;

        let rule_set_paths = vars
            .get("RULE_SET_PATHS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        let rule_event_queue_capacity =
            if let Some(value_str) = vars.get("RULE_EVENT_QUEUE_CAPACITY") {
                let value: usize = value_str.parse().map_err(|e| {
                    ConfigError::InvalidQueueCapacity(format!(
                        "RULE_EVENT_QUEUE_CAPACITY must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidQueueCapacity(
                        "RULE_EVENT_QUEUE_CAPACITY must be greater than 0".to_string(),
                    ));
                }

                value
            } else {
                DEFAULT_RULE_EVENT_QUEUE_CAPACITY
            };

        let metrics_bind_address = vars
            .get("METRICS_BIND_ADDRESS")
            .map(|value_str| {
                value_str.parse::<SocketAddr>().map_err(|e| {
                    ConfigError::InvalidMetricsAddress(format!(
                        "METRICS_BIND_ADDRESS must be a socket address, got '{}': {}",
                        value_str, e
                    ))
                })
            })
            .transpose()?;

        let log_format = match vars.get("LOG_FORMAT").map(|v| v.to_ascii_lowercase()) {
            None => LogFormat::default(),
            Some(value) if value == "text" => LogFormat::Text,
            Some(value) if value == "json" => LogFormat::Json,
            Some(value) => {
                return Err(ConfigError::InvalidLogFormat(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{}'",
                    value
                )))
            }
        };

        Ok(Config {
            pipeline_config_path,
            rule_set_paths,
            rule_event_queue_capacity,
            metrics_bind_address,
            log_format,
        })
    }
}
