//! Typed errors for the LLM client boundary, aggregated into
//! `memoria_core::Error` at the crate edge (SPEC_FULL.md §1.1).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("request timed out")]
    Timeout,

    #[error("response failed schema validation: {0}")]
    SchemaInvalid(String),

    #[error("response was not valid json: {0}")]
    InvalidJson(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("rate limited, retry after {0:?}")]
    RateLimited(std::time::Duration),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for memoria_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::SchemaInvalid(_) | LlmError::InvalidJson(_) => {
                memoria_core::Error::ExtractionError(err.to_string())
            }
            LlmError::RateLimited(_) => memoria_core::Error::RateLimited(err.to_string()),
            LlmError::Network(_) | LlmError::Api(_) | LlmError::Timeout => {
                memoria_core::Error::TransientBackend(err.to_string())
            }
            LlmError::Configuration(_) => memoria_core::Error::Fatal(err.to_string()),
        }
    }
}
