//! C2 — Ollama-backed `LlmClient`. Retry/backoff loop grounded on the
//! reference workspace's `OllamaBackend::generate_with_context`
//! (`crates/llm/src/backend.rs`), generalized from free-text generation
//! to schema-constrained JSON output: Ollama's `format` field carries
//! the caller's JSON Schema, and the response is re-validated locally
//! with `jsonschema` since not every backend enforces it server-side.

use std::time::Duration;

use async_trait::async_trait;
use jsonschema::JSONSchema;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use memoria_config::LlmConfig;
use memoria_core::{LlmClient, LlmRequest, LlmResponse, Result as CoreResult, TokenUsage};

use crate::error::LlmError;

pub struct OllamaLlmClient {
    client: Client,
    config: LlmConfig,
}

impl OllamaLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn api_url(&self) -> String {
        format!("{}/api/chat", self.config.endpoint.trim_end_matches('/'))
    }

    async fn issue(&self, prompt: &str, system: Option<&str>, schema: &Value) -> Result<Value, LlmError> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: sys.to_string(),
            });
        }
        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages,
            stream: false,
            format: Some(schema.clone()),
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self.client.post(self.api_url()).json(&request).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let jitter_ms = rand::thread_rng().gen_range(100..500);
            return Err(LlmError::RateLimited(Duration::from_millis(jitter_ms)));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("server error {status}: {body}")));
            }
            return Err(LlmError::Api(format!("{status}: {body}")));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidJson(e.to_string()))?;

        serde_json::from_str(&parsed.message.content)
            .map_err(|e| LlmError::InvalidJson(format!("{e}: {}", parsed.message.content)))
    }
}

#[async_trait]
impl LlmClient for OllamaLlmClient {
    async fn complete(&self, request: LlmRequest) -> CoreResult<LlmResponse> {
        let compiled_schema = JSONSchema::compile(&request.response_schema)
            .map_err(|e| LlmError::Configuration(format!("invalid response schema: {e}")))?;

        let mut backoff = Duration::from_millis(200);
        let mut last_err = LlmError::Network("no attempts made".to_string());
        let mut system = request.system.clone();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(attempt, ?backoff, "llm request retrying after failure");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            let outcome = self.issue(&request.prompt, system.as_deref(), &request.response_schema).await;

            match outcome {
                Ok(json) => {
                    if let Err(errors) = compiled_schema.validate(&json) {
                        let detail = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                        tracing::warn!(attempt, detail, "llm response failed schema validation");
                        last_err = LlmError::SchemaInvalid(detail.clone());
                        system = Some(format!(
                            "{}\n\nYour previous response was invalid: {detail}. Return ONLY JSON matching the schema.",
                            request.system.clone().unwrap_or_default()
                        ));
                        continue;
                    }
                    return Ok(LlmResponse {
                        json,
                        usage: Some(TokenUsage::default()),
                    });
                }
                Err(LlmError::RateLimited(delay)) => {
                    tracing::warn!(?delay, "llm rate limited");
                    tokio::time::sleep(delay).await;
                    last_err = LlmError::RateLimited(delay);
                }
                Err(e @ (LlmError::Network(_) | LlmError::Timeout)) => {
                    last_err = e;
                }
                Err(e @ LlmError::InvalidJson(_)) => {
                    last_err = e;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_err.into())
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_schema() {
        let config = LlmConfig {
            endpoint: "http://localhost:1".to_string(),
            ..Default::default()
        };
        let client = OllamaLlmClient::new(config).unwrap();
        assert_eq!(client.config.max_retries, LlmConfig::default().max_retries);
    }
}
