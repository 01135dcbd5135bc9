//! C1 — Ollama-backed `Vectorizer`. HTTP/retry plumbing grounded on the
//! reference workspace's `OllamaEmbedder` (`crates/rag/src/ollama_embeddings.rs`),
//! implementing `memoria_core::Vectorizer`'s `embed`/`embed_batch`/`embed_query`
//! shape and the query/document instruction-prefix split it already made.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use memoria_core::error::Result as CoreResult;
use memoria_core::types::Embedding;
use memoria_core::Vectorizer;

use crate::error::RagError;

/// Prefix applied to query text (not document text) before embedding,
/// matching instruction-tuned embedding models that distinguish the
/// two roles.
const QUERY_INSTRUCTION: &str =
    "Instruct: Retrieve memories relevant to the given conversational query\nQuery:";

#[derive(Debug, Clone)]
pub struct OllamaVectorizerConfig {
    pub endpoint: String,
    pub model: String,
    pub dim: usize,
}

impl Default for OllamaVectorizerConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: "qwen3-embedding:0.6b".to_string(),
            dim: 1024,
        }
    }
}

pub struct OllamaVectorizer {
    client: reqwest::Client,
    config: OllamaVectorizerConfig,
}

impl OllamaVectorizer {
    pub fn new(config: OllamaVectorizerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.config.endpoint.trim_end_matches('/'))
    }

    async fn embed_raw(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, RagError> {
        let request = EmbedRequest {
            model: self.config.model.clone(),
            input: inputs,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Connection(format!("{status}: {body}")));
        }

        let parsed: EmbedResponse = response.json().await?;
        Ok(parsed.embeddings)
    }

}

#[async_trait]
impl Vectorizer for OllamaVectorizer {
    async fn embed(&self, text: &str) -> CoreResult<Embedding> {
        let mut values = self.embed_raw(vec![text.to_string()]).await?;
        let vector = values.pop().ok_or_else(|| {
            RagError::Embedding("ollama returned no embedding for the document".to_string())
        })?;
        Ok(Embedding::new(self.config.model.clone(), vector))
    }

    /// Applies the retrieval instruction prefix, matching instruction-
    /// tuned embedding models that distinguish query from document text.
    async fn embed_query(&self, query: &str) -> CoreResult<Embedding> {
        let prefixed = format!("{QUERY_INSTRUCTION}{query}");
        let mut values = self.embed_raw(vec![prefixed]).await?;
        let vector = values.pop().ok_or_else(|| {
            RagError::Embedding("ollama returned no embedding for the query".to_string())
        })?;
        Ok(Embedding::new(self.config.model.clone(), vector))
    }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let values = self.embed_raw(texts.to_vec()).await?;
        Ok(values
            .into_iter()
            .map(|v| Embedding::new(self.config.model.clone(), v))
            .collect())
    }

    fn dim(&self) -> usize {
        self.config.dim
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_workspace_vector_dim() {
        let config = OllamaVectorizerConfig::default();
        assert_eq!(config.dim, 1024);
        assert_eq!(config.model, "qwen3-embedding:0.6b");
    }

    #[test]
    fn query_instruction_is_only_applied_to_query_text() {
        let query = "what does the user do for work?";
        let document = "the user works at an aerospace startup";
        assert!(format!("{QUERY_INSTRUCTION}{query}").starts_with(QUERY_INSTRUCTION));
        assert!(!document.starts_with(QUERY_INSTRUCTION));
    }
}
