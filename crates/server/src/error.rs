//! User-visible failure shape for the ingest/retrieve/administration
//! surfaces (SPEC_FULL.md §7: "ingest returns a structured error with
//! {code, message, request_id}"). `memoria_core::Error` already
//! carries the taxonomy; this module only attaches the request_id a
//! caller needs to correlate a failure with its log line.

use serde::Serialize;

use memoria_core::Error as CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    TransientBackend,
    RateLimited,
    ExtractionError,
    Fatal,
}

impl From<&CoreError> for ErrorCode {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::InvalidInput(_) => ErrorCode::InvalidInput,
            CoreError::TransientBackend(_) => ErrorCode::TransientBackend,
            CoreError::RateLimited(_) => ErrorCode::RateLimited,
            CoreError::ExtractionError(_) => ErrorCode::ExtractionError,
            CoreError::Fatal(_) => ErrorCode::Fatal,
        }
    }
}

/// §7's public failure envelope. `NotFound`/`Conflict` never produce
/// one of these — both are encoded in the success path instead.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl ApiError {
    pub fn from_core(err: CoreError, request_id: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::from(&err),
            message: err.to_string(),
            request_id: request_id.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} (request_id={})", serde_json::to_string(&self.code).unwrap_or_default(), self.message, self.request_id)
    }
}

impl std::error::Error for ApiError {}

/// Composition-root startup failures — distinct from `ApiError`, which
/// is the per-request envelope a caller sees once the core is running.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("llm client: {0}")]
    Llm(#[from] memoria_llm::LlmError),

    #[error("persistence: {0}")]
    Persistence(#[from] memoria_persistence::PersistenceError),

    #[error("rag backend: {0}")]
    Rag(#[from] memoria_rag::RagError),

    #[error("configuration: {0}")]
    Config(#[from] memoria_config::ConfigError),
}
