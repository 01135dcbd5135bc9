//! C2 — prompt → JSON-typed response with retries (§4.10).

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// JSON Schema the response must validate against.
    pub response_schema: Value,
    pub deadline: Duration,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, response_schema: Value) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.0,
            max_tokens: 2048,
            response_schema,
            deadline: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub json: Value,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issue `request`, retrying transport errors with backoff and
    /// retrying schema-invalid responses up to the client's configured
    /// `R_parse` before surfacing a typed parse error (§4.10, §7
    /// `ExtractionError`).
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;
}
