use tagalloc_config::ConfigError;
use tagalloc_core::TrackerError;
use tagalloc_telemetry::MetricsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{live} allocations still tracked after all threads finished")]
    Leaked { live: usize },

    #[error("Stress worker panicked")]
    WorkerPanicked,
}
