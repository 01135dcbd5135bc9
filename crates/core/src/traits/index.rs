//! C4 / C5 — bulk lexical indexing + BM25, and vector upsert +
//! cosine-ANN (§4.10). Concrete implementations in `memoria-rag`
//! (Tantivy for C4, Qdrant for C5).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Embedding, IndexRecord, ScopeFilter, ScoredHit};

#[async_trait]
pub trait LexicalIndex: Send + Sync {
    async fn bulk_index(&self, records: &[IndexRecord]) -> Result<()>;

    async fn search(
        &self,
        query: &str,
        filter: &ScopeFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredHit>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<()>;

    /// `radius`, when set, drops results with `cosine < radius`
    /// (§4.9 step 3).
    async fn search(
        &self,
        query: &Embedding,
        filter: &ScopeFilter,
        top_k: usize,
        radius: Option<f32>,
    ) -> Result<Vec<ScoredHit>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;
}
