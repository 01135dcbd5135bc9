//! C4 — Tantivy-backed `LexicalIndex` over `IndexRecord` (§4.8/§4.9).
//! Schema, multilingual tokenizer and index/search/delete shape are
//! grounded on the reference workspace's `SparseIndex`
//! (`crates/rag/src/sparse_search.rs`), generalized from the teacher's
//! `Document` type to `IndexRecord` and from a single `content` field
//! to the pre-tokenized `search_content` field the Sync Service (C13)
//! produces.
//!
//! One instance indexes a single logical collection (the caller wires
//! up one instance per `DataSource` — "episode", "event_log",
//! "semantic_memory" — per §4.8); `ScopeFilter` is applied client-side
//! against the stored payload after an over-fetch, the same
//! can't-filter-natively pattern `memoria-persistence` uses for
//! `SemanticMemoryStore::list_holding_at`.

use std::sync::RwLock;

use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
};
use tantivy::{doc, Index, IndexReader, IndexWriter};

use memoria_core::error::Result as CoreResult;
use memoria_core::traits::index::LexicalIndex;
use memoria_core::types::{IndexRecord, ScopeFilter, ScoredHit, SearchSource};

use crate::error::RagError;

const MULTILINGUAL_TOKENIZER: &str = "multilingual";
const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Debug, Clone)]
pub struct LexicalIndexConfig {
    /// Directory the index is persisted under; `None` builds an
    /// ephemeral in-RAM index (tests, local dev).
    pub index_path: Option<String>,
    pub language: String,
    /// Multiplier applied to `top_k` before client-side scope
    /// filtering, so a narrow scope doesn't starve the result set.
    pub overfetch_factor: usize,
}

impl Default for LexicalIndexConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            language: "en".to_string(),
            overfetch_factor: 4,
        }
    }
}

pub struct TantivyLexicalIndex {
    index: Index,
    reader: IndexReader,
    writer: RwLock<IndexWriter>,
    schema: Schema,
    id_field: Field,
    payload_field: Field,
    content_field: Field,
    config: LexicalIndexConfig,
}

impl TantivyLexicalIndex {
    pub fn new(config: LexicalIndexConfig) -> Result<Self, RagError> {
        let mut builder = Schema::builder();
        let id_field = builder.add_text_field("id", STRING | STORED);
        let payload_field = builder.add_text_field("payload_json", STORED);
        let content_field = builder.add_text_field("search_content", TEXT);
        let schema = builder.build();

        let index = match &config.index_path {
            Some(path) => {
                std::fs::create_dir_all(path)
                    .map_err(|e| RagError::LexicalIndex(format!("create index dir: {e}")))?;
                let dir = MmapDirectory::open(path)?;
                Index::open_or_create(dir, schema.clone())?
            },
            None => Index::create_in_ram(schema.clone()),
        };

        index
            .tokenizers()
            .register(MULTILINGUAL_TOKENIZER, Self::build_tokenizer(&config.language));

        let reader = index.reader()?;
        let writer = index.writer(WRITER_HEAP_BYTES)?;

        Ok(Self {
            index,
            reader,
            writer: RwLock::new(writer),
            schema,
            id_field,
            payload_field,
            content_field,
            config,
        })
    }

    fn build_tokenizer(language: &str) -> TextAnalyzer {
        let builder = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser);

        match language {
            "en" | "english" => builder.filter(Stemmer::new(Language::English)).build(),
            _ => {
                tracing::debug!(language, "no stemmer available for language, using base tokenizer");
                builder.build()
            },
        }
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

#[async_trait]
impl LexicalIndex for TantivyLexicalIndex {
    async fn bulk_index(&self, records: &[IndexRecord]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let payloads: Vec<(String, String)> = records
            .iter()
            .map(|r| {
                Ok::<_, RagError>((
                    r.id.clone(),
                    serde_json::to_string(r)
                        .map_err(|e| RagError::LexicalIndex(format!("serialize record: {e}")))?,
                ))
            })
            .collect::<Result<_, _>>()?;

        let mut writer = self
            .writer
            .write()
            .map_err(|_| RagError::LexicalIndex("index writer lock poisoned".to_string()))?;

        for (record, (_, payload)) in records.iter().zip(&payloads) {
            writer.delete_term(tantivy::Term::from_field_text(self.id_field, &record.id));
            writer.add_document(doc!(
                self.id_field => record.id.clone(),
                self.payload_field => payload.clone(),
                self.content_field => record.search_content.join(" "),
            ))?;
        }
        writer.commit()?;
        drop(writer);

        self.reader.reload()?;
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        filter: &ScopeFilter,
        top_k: usize,
    ) -> CoreResult<Vec<ScoredHit>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.content_field]);
        let parsed = parser
            .parse_query(query)
            .map_err(|e| RagError::LexicalIndex(format!("query parse: {e}")))?;

        let fetch_n = top_k.saturating_mul(self.config.overfetch_factor).max(top_k);
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(fetch_n))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (rank, (score, address)) in top_docs.into_iter().enumerate() {
            let retrieved = searcher.doc::<tantivy::TantivyDocument>(address)?;
            let payload = retrieved
                .get_first(self.payload_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| RagError::LexicalIndex("document missing payload_json".to_string()))?;
            let record: IndexRecord = serde_json::from_str(payload)
                .map_err(|e| RagError::LexicalIndex(format!("deserialize record: {e}")))?;

            if !record.matches_scope(filter) {
                continue;
            }

            hits.push(ScoredHit {
                record,
                score,
                source: SearchSource::Bm25,
                rank,
            });
            if hits.len() >= top_k {
                break;
            }
        }

        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> CoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut writer = self
            .writer
            .write()
            .map_err(|_| RagError::LexicalIndex("index writer lock poisoned".to_string()))?;
        for id in ids {
            writer.delete_term(tantivy::Term::from_field_text(self.id_field, id));
        }
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memoria_core::types::DataSource;
    use std::collections::BTreeSet;

    fn record(id: &str, user_id: &str, text: &str) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            data_source: DataSource::Episode,
            user_id: Some(user_id.to_string()),
            group_id: None,
            participants: BTreeSet::new(),
            primary_text: text.to_string(),
            search_content: text.split_whitespace().map(str::to_lowercase).collect(),
            embedding: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn indexes_and_finds_by_term() {
        let index = TantivyLexicalIndex::new(LexicalIndexConfig::default()).unwrap();
        index
            .bulk_index(&[record("r1", "u1", "berlin trip planning")])
            .await
            .unwrap();

        let hits = index
            .search("berlin", &ScopeFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "r1");
    }

    #[tokio::test]
    async fn scope_filter_excludes_other_users() {
        let index = TantivyLexicalIndex::new(LexicalIndexConfig::default()).unwrap();
        index
            .bulk_index(&[record("r1", "u1", "berlin trip planning")])
            .await
            .unwrap();

        let filter = ScopeFilter {
            user_id: Some("u2".to_string()),
            ..Default::default()
        };
        let hits = index.search("berlin", &filter, 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let index = TantivyLexicalIndex::new(LexicalIndexConfig::default()).unwrap();
        index
            .bulk_index(&[record("r1", "u1", "berlin trip planning")])
            .await
            .unwrap();
        index.delete(&["r1".to_string()]).await.unwrap();

        let hits = index.search("berlin", &ScopeFilter::default(), 10).await.unwrap();
        assert!(hits.is_empty());
    }
}
