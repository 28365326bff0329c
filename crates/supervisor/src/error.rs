//! Supervisor Error Types

use hazards::ThresholdError;
use thiserror::Error;

/// Errors reading or writing the parameter store
#[derive(Debug, Error)]
pub enum ParamsError {
    /// Key is empty or would escape the parameter directory
    #[error("Invalid parameter key: {0:?}")]
    InvalidKey(String),

    /// Filesystem error on one key
    #[error("Parameter {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that stop the supervisor from starting or shutting down cleanly
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Configuration file or environment could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Loop rate must be positive and finite
    #[error("Invalid tick rate: {0} Hz")]
    InvalidTickRate(f64),

    #[error(transparent)]
    Thresholds(#[from] ThresholdError),

    #[error(transparent)]
    Params(#[from] ParamsError),

    /// Prometheus exporter could not be installed
    #[error("Metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    /// The parameter refresh task panicked or was cancelled
    #[error("Parameter refresh task failed: {0}")]
    RefreshTask(#[from] tokio::task::JoinError),
}
