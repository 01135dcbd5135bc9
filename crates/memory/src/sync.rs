//! C13 — Sync Service (§4.8). Turns a freshly persisted record
//! (MemCell / AtomicEvent / SemanticMemory) into an `IndexRecord` and
//! pushes it to both the lexical and vector indexes for its
//! `DataSource`, concurrently.
//!
//! Grounded on `crates/rag/src/retriever.rs`'s `tokio::join!`
//! dense/sparse dispatch: a lexical-index outage must not block the
//! vector write (or vice versa), so both writes are issued together
//! and their outcomes reported independently rather than short-
//! circuited with `?`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use memoria_core::error::Result as CoreResult;
use memoria_core::traits::index::{LexicalIndex, VectorIndex};
use memoria_core::types::{DataSource, Embedding, IndexRecord};

/// A tiny, deliberately short stopword list — the Sync Service only
/// needs to keep near-useless function words out of the lexical
/// index, not perform full NLP; the heavier multilingual stemming
/// pipeline lives in the Tantivy adapter itself (C4).
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "to", "of", "and", "or", "in",
    "on", "at", "it", "this", "that", "for", "with", "as", "i", "you", "he", "she", "we", "they",
];

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncResult {
    pub lexical_ok: bool,
    pub vector_ok: bool,
}

pub struct SyncInput {
    pub id: String,
    pub data_source: DataSource,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub participants: BTreeSet<String>,
    pub primary_text: String,
    pub embedding: Option<Embedding>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl SyncInput {
    fn into_record(self) -> IndexRecord {
        IndexRecord {
            id: self.id,
            data_source: self.data_source,
            user_id: self.user_id,
            group_id: self.group_id,
            participants: self.participants,
            search_content: tokenize(&self.primary_text),
            primary_text: self.primary_text,
            embedding: self.embedding,
            timestamp: self.timestamp,
        }
    }
}

pub struct SyncService {
    lexical: HashMap<DataSource, Arc<dyn LexicalIndex>>,
    vector: HashMap<DataSource, Arc<dyn VectorIndex>>,
}

impl SyncService {
    pub fn new(
        lexical: HashMap<DataSource, Arc<dyn LexicalIndex>>,
        vector: HashMap<DataSource, Arc<dyn VectorIndex>>,
    ) -> Self {
        Self { lexical, vector }
    }

    /// Indexes a single record into its `DataSource`'s lexical and
    /// vector backends concurrently. Missing embeddings (the
    /// extractor dropped a record before it could be embedded) skip
    /// the vector write but still lexically index.
    pub async fn sync(&self, input: SyncInput) -> CoreResult<SyncResult> {
        let data_source = input.data_source;
        let record = input.into_record();
        let has_embedding = record.embedding.is_some();

        let lexical_fut = async {
            match self.lexical.get(&data_source) {
                Some(index) => index.bulk_index(std::slice::from_ref(&record)).await.is_ok(),
                None => false,
            }
        };
        let vector_fut = async {
            if !has_embedding {
                return true;
            }
            match self.vector.get(&data_source) {
                Some(index) => index.upsert(std::slice::from_ref(&record)).await.is_ok(),
                None => false,
            }
        };

        let (lexical_ok, vector_ok) = tokio::join!(lexical_fut, vector_fut);
        if !lexical_ok {
            tracing::warn!(id = %record.id, ?data_source, "lexical sync failed");
        }
        if !vector_ok {
            tracing::warn!(id = %record.id, ?data_source, "vector sync failed");
        }
        Ok(SyncResult { lexical_ok, vector_ok })
    }

    /// Syncs many records, one `sync` call per record run
    /// concurrently. Partial failures are reported per-id rather than
    /// aborting the batch.
    pub async fn sync_many(&self, inputs: Vec<SyncInput>) -> CoreResult<Vec<SyncResult>> {
        let futures = inputs.into_iter().map(|input| self.sync(input));
        futures::future::try_join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use memoria_core::types::{ScopeFilter, ScoredHit};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLexical(AtomicUsize);
    #[async_trait]
    impl LexicalIndex for CountingLexical {
        async fn bulk_index(&self, records: &[IndexRecord]) -> CoreResult<()> {
            self.0.fetch_add(records.len(), Ordering::SeqCst);
            Ok(())
        }
        async fn search(&self, _query: &str, _filter: &ScopeFilter, _top_k: usize) -> CoreResult<Vec<ScoredHit>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _ids: &[String]) -> CoreResult<()> {
            Ok(())
        }
    }

    struct FailingVector;
    #[async_trait]
    impl VectorIndex for FailingVector {
        async fn upsert(&self, _records: &[IndexRecord]) -> CoreResult<()> {
            Err(memoria_core::error::Error::TransientBackend("down".into()))
        }
        async fn search(
            &self,
            _query: &Embedding,
            _filter: &ScopeFilter,
            _top_k: usize,
            _radius: Option<f32>,
        ) -> CoreResult<Vec<ScoredHit>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _ids: &[String]) -> CoreResult<()> {
            Ok(())
        }
    }

    fn input() -> SyncInput {
        SyncInput {
            id: "e1".to_string(),
            data_source: DataSource::Episode,
            user_id: None,
            group_id: Some("g1".to_string()),
            participants: BTreeSet::from(["u1".to_string()]),
            primary_text: "The user said Hello to the group".to_string(),
            embedding: Some(Embedding::new("m", vec![0.1])),
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn tokenize_drops_stopwords_and_lowercases() {
        let tokens = tokenize("The Quick Fox is in the Garden");
        assert_eq!(tokens, vec!["quick", "fox", "garden"]);
    }

    #[tokio::test]
    async fn vector_failure_does_not_block_lexical_write() {
        let lexical_calls = Arc::new(CountingLexical(AtomicUsize::new(0)));
        let mut lexical: HashMap<DataSource, Arc<dyn LexicalIndex>> = HashMap::new();
        lexical.insert(DataSource::Episode, lexical_calls.clone());
        let mut vector: HashMap<DataSource, Arc<dyn VectorIndex>> = HashMap::new();
        vector.insert(DataSource::Episode, Arc::new(FailingVector));

        let service = SyncService::new(lexical, vector);
        let result = service.sync(input()).await.unwrap();

        assert!(result.lexical_ok);
        assert!(!result.vector_ok);
        assert_eq!(lexical_calls.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_embedding_skips_vector_write_without_failing() {
        let lexical: HashMap<DataSource, Arc<dyn LexicalIndex>> = {
            let mut m = HashMap::new();
            m.insert(DataSource::Episode, Arc::new(CountingLexical(AtomicUsize::new(0))) as Arc<dyn LexicalIndex>);
            m
        };
        let vector: HashMap<DataSource, Arc<dyn VectorIndex>> = HashMap::new();
        let service = SyncService::new(lexical, vector);

        let mut i = input();
        i.embedding = None;
        let result = service.sync(i).await.unwrap();
        assert!(result.lexical_ok);
        assert!(result.vector_ok);
    }
}
