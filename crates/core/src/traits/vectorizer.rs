//! C1 — text → fixed-dim float vector (§4.10).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Embedding;

#[async_trait]
pub trait Vectorizer: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed a retrieval query. Implementations that distinguish
    /// query/document roles (e.g. instruction-tuned models) override
    /// this; the default treats a query like any other document.
    async fn embed_query(&self, query: &str) -> Result<Embedding> {
        self.embed(query).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }

    /// Dimension of vectors this implementation produces, so callers
    /// can reject a mixed-dim search before issuing it.
    fn dim(&self) -> usize;

    fn model_id(&self) -> &str;
}
