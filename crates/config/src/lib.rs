//! Typed, layered configuration for the memory system.
//!
//! Loads from (highest to lowest priority):
//! 1. Environment variables (`MEMORIA_` prefix)
//! 2. `config/{env}.yaml` (when an environment name is given)
//! 3. `config/default.yaml`
//! 4. The `Default` impl below, which carries every tunable named in
//!    the component design (MIN_WINDOW, MAX_TOKENS, R, T_GAP,
//!    SIMILARITY_THRESHOLD, rrf k0, max_rounds, queue capacity N, TTL).

pub mod settings;

pub use settings::{
    ClusteringConfig, ExtractionConfig, LlmConfig, ObservabilityConfig, PersistenceConfig,
    ProfileConfig, QueueConfig, RetrievalConfig, RuntimeEnvironment, SegmentationConfig, Settings,
    load_settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
