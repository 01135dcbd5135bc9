//! C14 — lightweight retrieval (§4.9, "Lightweight retrieval"): bm25,
//! embedding, or rrf over a single `DataSource`. Concurrent bm25/
//! embedding dispatch and Reciprocal Rank Fusion are grounded on the
//! reference workspace's `HybridRetriever::search`/`rrf_fusion`
//! (`crates/rag/src/retriever.rs`), generalized from a fixed
//! dense-weight blend to the spec's equal-weight RRF formula and from
//! `SearchResult`/`SearchSource::{Dense,Sparse,Hybrid}` to
//! `memoria_core`'s `ScoredHit`/`SearchSource::{Bm25,Embedding,Rrf}`.

use std::collections::HashMap;
use std::sync::Arc;

use memoria_config::RetrievalConfig;
use memoria_core::error::Result as CoreResult;
use memoria_core::traits::index::{LexicalIndex, VectorIndex};
use memoria_core::traits::vectorizer::Vectorizer;
use memoria_core::types::{DataSource, RetrievalMode, ScopeFilter, ScoredHit, SearchSource, TimeRange};

use crate::error::RagError;

pub struct RetrieveRequest {
    pub query: String,
    pub data_source: DataSource,
    pub mode: RetrievalMode,
    pub filter: ScopeFilter,
    pub top_k: usize,
    pub time_range: Option<TimeRange>,
    pub radius: Option<f32>,
}

/// Per-`DataSource` lexical/vector backends plus the shared embedder,
/// wired by the caller (`memoria-memory`'s composition root).
pub struct RetrievalEngine {
    lexical: HashMap<DataSource, Arc<dyn LexicalIndex>>,
    vector: HashMap<DataSource, Arc<dyn VectorIndex>>,
    vectorizer: Arc<dyn Vectorizer>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(vectorizer: Arc<dyn Vectorizer>, config: RetrievalConfig) -> Self {
        Self {
            lexical: HashMap::new(),
            vector: HashMap::new(),
            vectorizer,
            config,
        }
    }

    pub fn with_lexical(mut self, source: DataSource, index: Arc<dyn LexicalIndex>) -> Self {
        self.lexical.insert(source, index);
        self
    }

    pub fn with_vector(mut self, source: DataSource, index: Arc<dyn VectorIndex>) -> Self {
        self.vector.insert(source, index);
        self
    }

    fn lexical_for(&self, source: DataSource) -> Result<&Arc<dyn LexicalIndex>, RagError> {
        self.lexical
            .get(&source)
            .ok_or_else(|| RagError::LexicalIndex(format!("no lexical index wired for {source:?}")))
    }

    fn vector_for(&self, source: DataSource) -> Result<&Arc<dyn VectorIndex>, RagError> {
        self.vector
            .get(&source)
            .ok_or_else(|| RagError::VectorIndex(format!("no vector index wired for {source:?}")))
    }

    pub async fn retrieve(&self, req: RetrieveRequest) -> CoreResult<Vec<ScoredHit>> {
        let hits = match req.mode {
            RetrievalMode::Bm25 => self.search_bm25(&req).await?,
            RetrievalMode::Embedding => self.search_embedding(&req).await?,
            RetrievalMode::Rrf => {
                let (bm25, embedding) =
                    tokio::join!(self.search_bm25(&req), self.search_embedding(&req));
                self.rrf_fusion(&bm25?, &embedding?)
            },
        };

        Ok(apply_time_range(hits, req.time_range.as_ref())
            .into_iter()
            .take(req.top_k)
            .collect())
    }

    async fn search_bm25(&self, req: &RetrieveRequest) -> CoreResult<Vec<ScoredHit>> {
        let index = self.lexical_for(req.data_source)?;
        index.search(&req.query, &req.filter, req.top_k).await
    }

    async fn search_embedding(&self, req: &RetrieveRequest) -> CoreResult<Vec<ScoredHit>> {
        let index = self.vector_for(req.data_source)?;
        let embedding = self.vectorizer.embed_query(&req.query).await?;
        index.search(&embedding, &req.filter, req.top_k, req.radius).await
    }

    /// Reciprocal Rank Fusion, per §4.9 step 4:
    /// `score(d) = Σ_{lists containing d} 1 / (k₀ + rank_list(d))`,
    /// with `rank_list` 1-indexed. Ties break by higher underlying
    /// vector score, then by recency.
    fn rrf_fusion(&self, bm25: &[ScoredHit], embedding: &[ScoredHit]) -> Vec<ScoredHit> {
        let k0 = self.config.rrf_k;
        let mut fused: HashMap<String, (f32, ScoredHit, f32)> = HashMap::new();

        for (rank, hit) in bm25.iter().enumerate() {
            let contribution = 1.0 / (k0 + rank as f32 + 1.0);
            fused
                .entry(hit.record.id.clone())
                .and_modify(|(score, _, _)| *score += contribution)
                .or_insert((contribution, hit.clone(), 0.0));
        }

        for (rank, hit) in embedding.iter().enumerate() {
            let contribution = 1.0 / (k0 + rank as f32 + 1.0);
            fused
                .entry(hit.record.id.clone())
                .and_modify(|(score, existing, vector_score)| {
                    *score += contribution;
                    existing.source = SearchSource::Rrf;
                    *vector_score = hit.score;
                })
                .or_insert_with(|| {
                    let mut marked = hit.clone();
                    marked.source = SearchSource::Rrf;
                    (contribution, marked, hit.score)
                });
        }

        let mut results: Vec<(f32, ScoredHit, f32)> = fused.into_values().collect();
        results.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap()
                .then_with(|| b.2.partial_cmp(&a.2).unwrap())
                .then_with(|| b.1.record.timestamp.cmp(&a.1.record.timestamp))
        });

        results
            .into_iter()
            .enumerate()
            .map(|(rank, (score, mut hit, _))| {
                hit.score = score;
                hit.rank = rank;
                hit
            })
            .collect()
    }
}

fn apply_time_range(hits: Vec<ScoredHit>, range: Option<&TimeRange>) -> Vec<ScoredHit> {
    let Some(range) = range else { return hits };
    hits.into_iter()
        .filter(|h| h.record.timestamp >= range.start && h.record.timestamp <= range.end)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memoria_core::types::IndexRecord;
    use std::collections::BTreeSet;

    fn hit(id: &str, rank: usize, score: f32, source: SearchSource) -> ScoredHit {
        ScoredHit {
            record: IndexRecord {
                id: id.to_string(),
                data_source: DataSource::Episode,
                user_id: None,
                group_id: None,
                participants: BTreeSet::new(),
                primary_text: String::new(),
                search_content: Vec::new(),
                embedding: None,
                timestamp: Utc::now(),
            },
            score,
            source,
            rank,
        }
    }

    fn engine() -> RetrievalEngine {
        struct NoopVectorizer;
        #[async_trait::async_trait]
        impl Vectorizer for NoopVectorizer {
            async fn embed(&self, _text: &str) -> CoreResult<memoria_core::types::Embedding> {
                Ok(memoria_core::types::Embedding::new("noop", vec![0.0]))
            }
            fn dim(&self) -> usize {
                1
            }
            fn model_id(&self) -> &str {
                "noop"
            }
        }
        RetrievalEngine::new(Arc::new(NoopVectorizer), RetrievalConfig::default())
    }

    #[test]
    fn rrf_boosts_documents_in_both_lists() {
        let engine = engine();
        let bm25 = vec![
            hit("1", 0, 9.0, SearchSource::Bm25),
            hit("2", 1, 8.0, SearchSource::Bm25),
        ];
        let embedding = vec![
            hit("2", 0, 0.9, SearchSource::Embedding),
            hit("3", 1, 0.7, SearchSource::Embedding),
        ];

        let fused = engine.rrf_fusion(&bm25, &embedding);
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].record.id, "2");
        assert_eq!(fused[0].source, SearchSource::Rrf);
    }

    #[test]
    fn time_range_filters_out_of_window_hits() {
        let mut h = hit("1", 0, 1.0, SearchSource::Bm25);
        h.record.timestamp = Utc::now() - chrono::Duration::days(10);
        let range = TimeRange {
            start: Utc::now() - chrono::Duration::days(1),
            end: Utc::now(),
        };
        assert!(apply_time_range(vec![h], Some(&range)).is_empty());
    }
}
