//! Main settings module, grounded on the reference workspace's
//! layered `config`-crate settings (env > file > defaults).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment enum; strict mode tightens validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// §4.1 Conversation Queue tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Per-group capacity N; oldest entries truncate when exceeded.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// TTL (seconds) refreshed on write; expired keys are lazily
    /// removed on access.
    #[serde(default = "default_queue_ttl_secs")]
    pub ttl_secs: u64,

    /// Probability (0.0-1.0) of a lazy expiration sweep on access.
    #[serde(default = "default_sweep_probability")]
    pub sweep_probability: f32,
}

fn default_queue_capacity() -> usize {
    1000
}
fn default_queue_ttl_secs() -> u64 {
    7 * 24 * 3600
}
fn default_sweep_probability() -> f32 {
    0.01
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            ttl_secs: default_queue_ttl_secs(),
            sweep_probability: default_sweep_probability(),
        }
    }
}

/// §4.3 Segmentation Engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// MIN_WINDOW: below this message count, never attempt a
    /// boundary decision.
    #[serde(default = "default_min_window")]
    pub min_window: usize,

    /// Minimum time span (seconds) the window must cover before a
    /// boundary decision is attempted.
    #[serde(default = "default_min_span_secs")]
    pub min_span_secs: u64,

    /// MAX_TOKENS the prompt is packed to; oldest messages drop first.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// R: validation-failure retry budget before ExtractionError.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_min_window() -> usize {
    3
}
fn default_min_span_secs() -> u64 {
    60
}
fn default_max_tokens() -> usize {
    4096
}
fn default_max_retries() -> u32 {
    3
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_window: default_min_window(),
            min_span_secs: default_min_span_secs(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
        }
    }
}

/// §4.4 Memory Extractor tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// δ: tolerated slack (seconds) between an AtomicEvent's
    /// timestamp and its parent MemCell's timestamp.
    #[serde(default = "default_extraction_slack_secs")]
    pub timestamp_slack_secs: i64,

    /// Sanity ceiling a numeric field (e.g. duration_days) is
    /// clipped to before being logged and kept.
    #[serde(default = "default_duration_ceiling_days")]
    pub duration_ceiling_days: i64,
}

fn default_extraction_slack_secs() -> i64 {
    3600
}
fn default_duration_ceiling_days() -> i64 {
    365 * 50
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timestamp_slack_secs: default_extraction_slack_secs(),
            duration_ceiling_days: default_duration_ceiling_days(),
        }
    }
}

/// §4.5 Cluster Manager tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// SIMILARITY_THRESHOLD: minimum cosine to join an existing
    /// cluster rather than start a new one.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// T_GAP: clusters whose last_ts is more than this many seconds
    /// behind a candidate's timestamp are skipped.
    #[serde(default = "default_time_gap_secs")]
    pub time_gap_secs: i64,

    /// Member count a cluster must reach (or cross a multiple of)
    /// before the contributing user's profile is queued for refresh.
    #[serde(default = "default_profile_refresh_membership")]
    pub profile_refresh_membership: u64,
}

fn default_similarity_threshold() -> f32 {
    0.70
}
fn default_time_gap_secs() -> i64 {
    7 * 24 * 3600
}
fn default_profile_refresh_membership() -> u64 {
    3
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            time_gap_secs: default_time_gap_secs(),
            profile_refresh_membership: default_profile_refresh_membership(),
        }
    }
}

/// §4.6 Profile Manager tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Bounded retry budget for a profile rewrite attempt.
    #[serde(default = "default_profile_max_retries")]
    pub max_retries: u32,

    /// Most-recent-K MemCells considered when rebuilding a profile.
    #[serde(default = "default_profile_batch_size")]
    pub batch_size: usize,
}

fn default_profile_max_retries() -> u32 {
    3
}
fn default_profile_batch_size() -> usize {
    50
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            max_retries: default_profile_max_retries(),
            batch_size: default_profile_batch_size(),
        }
    }
}

/// §4.9 Retrieval Engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_dense_top_k")]
    pub dense_top_k: usize,

    #[serde(default = "default_sparse_top_k")]
    pub sparse_top_k: usize,

    #[serde(default = "default_final_top_k")]
    pub final_top_k: usize,

    /// k0 in RRF's `1 / (k0 + rank)`.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// Minimum cosine radius a vector hit must clear.
    #[serde(default = "default_vector_radius")]
    pub vector_radius: f32,

    /// Agentic retrieval's reasoning budget (typically 2).
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

fn default_dense_top_k() -> usize {
    20
}
fn default_sparse_top_k() -> usize {
    20
}
fn default_final_top_k() -> usize {
    10
}
fn default_rrf_k() -> f32 {
    60.0
}
fn default_vector_radius() -> f32 {
    0.0
}
fn default_max_rounds() -> u32 {
    2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_top_k: default_dense_top_k(),
            sparse_top_k: default_sparse_top_k(),
            final_top_k: default_final_top_k(),
            rrf_k: default_rrf_k(),
            vector_radius: default_vector_radius(),
            max_rounds: default_max_rounds(),
        }
    }
}

/// C2 LLM Client tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Transport-error retry budget before surfacing TransientBackend.
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
}

fn default_llm_endpoint() -> String {
    std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string())
}
fn default_llm_model() -> String {
    "qwen2.5:7b".to_string()
}
fn default_llm_max_retries() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    30
}
fn default_llm_temperature() -> f32 {
    0.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key: None,
            max_retries: default_llm_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
            temperature: default_llm_temperature(),
        }
    }
}

/// Store connection settings for C3/C4/C5's adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable ScyllaDB/Qdrant/Tantivy persistence (false = in-memory
    /// fakes only, for local development).
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub scylla_keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub scylla_replication_factor: u8,

    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,

    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,

    /// Filesystem path Tantivy's lexical index is built at.
    #[serde(default = "default_tantivy_path")]
    pub tantivy_index_path: String,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}
fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "memoria".to_string())
}
fn default_replication_factor() -> u8 {
    1
}
fn default_qdrant_endpoint() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6333".to_string())
}
fn default_qdrant_collection() -> String {
    "memoria_records".to_string()
}
fn default_vector_dim() -> usize {
    1024
}
fn default_tantivy_path() -> String {
    "data/tantivy".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            scylla_keyspace: default_scylla_keyspace(),
            scylla_replication_factor: default_replication_factor(),
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection: default_qdrant_collection(),
            qdrant_api_key: None,
            vector_dim: default_vector_dim(),
            tantivy_index_path: default_tantivy_path(),
        }
    }
}

/// Observability configuration — structured logging/tracing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub tracing_enabled: bool,

    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default)]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            tracing_enabled: true,
            otlp_endpoint: None,
            metrics_enabled: false,
        }
    }
}

/// Top-level settings aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub segmentation: SegmentationConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_clustering()?;
        self.validate_retrieval()?;
        self.validate_segmentation()?;
        Ok(())
    }

    fn validate_clustering(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.clustering.similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "clustering.similarity_threshold".to_string(),
                message: format!(
                    "must be between 0.0 and 1.0, got {}",
                    self.clustering.similarity_threshold
                ),
            });
        }
        if self.clustering.time_gap_secs <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "clustering.time_gap_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        if r.rrf_k <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.rrf_k".to_string(),
                message: format!("must be positive, got {}", r.rrf_k),
            });
        }
        if r.final_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.final_top_k".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if r.max_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.max_rounds".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if r.final_top_k > r.dense_top_k && r.final_top_k > r.sparse_top_k {
            tracing::warn!(
                "retrieval.final_top_k ({}) exceeds both dense_top_k ({}) and sparse_top_k ({}); \
                 results will be limited by retrieval",
                r.final_top_k,
                r.dense_top_k,
                r.sparse_top_k
            );
        }
        Ok(())
    }

    fn validate_segmentation(&self) -> Result<(), ConfigError> {
        if self.segmentation.min_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "segmentation.min_window".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.segmentation.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "segmentation.max_tokens".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`MEMORIA_` prefix)
/// 2. `config/{env}.yaml` (if `env` specified)
/// 3. `config/default.yaml`
/// 4. `Settings::default()`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("MEMORIA")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.clustering.similarity_threshold, 0.70);
        assert_eq!(settings.queue.capacity, 1000);
    }

    #[test]
    fn rejects_bad_similarity_threshold() {
        let mut settings = Settings::default();
        settings.clustering.similarity_threshold = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_nonpositive_rrf_k() {
        let mut settings = Settings::default();
        settings.retrieval.rrf_k = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_min_window() {
        let mut settings = Settings::default();
        settings.segmentation.min_window = 0;
        assert!(settings.validate().is_err());
    }
}
