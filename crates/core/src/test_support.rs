//! In-memory fakes for C2-C5, shared by every crate's test suite so
//! none of them needs a live ScyllaDB/Qdrant/Tantivy-on-disk/network
//! LLM to exercise the pipelines (SPEC_FULL.md §1.1 test tooling).
//! Gated behind `test-support` so it never ships in a production
//! binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::traits::*;
use crate::types::*;

/// Deterministic LLM stub: a queue of canned JSON responses, returned
/// in order regardless of the prompt. Used by P4's replay test (same
/// script in, same MemCells out) and by S5's always-insufficient
/// agentic-retrieval stub.
pub struct StubLlmClient {
    responses: Mutex<std::collections::VecDeque<Value>>,
    default_response: Option<Value>,
}

impl StubLlmClient {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            default_response: None,
        }
    }

    /// Always returns the same response, ignoring call order — used
    /// for S5 (`is_sufficient=false` on every round).
    pub fn repeating(response: Value) -> Self {
        Self {
            responses: Mutex::new(Default::default()),
            default_response: Some(response),
        }
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
        if let Some(ref resp) = self.default_response {
            return Ok(LlmResponse {
                json: resp.clone(),
                usage: None,
            });
        }
        let mut q = self.responses.lock();
        let json = q
            .pop_front()
            .ok_or_else(|| Error::ExtractionError("stub exhausted".into()))?;
        Ok(LlmResponse { json, usage: None })
    }
}

/// Deterministic embedder: hashes the text into a low-dimensional
/// vector so cosine similarity is stable across runs without pulling
/// in a real model.
pub struct FakeVectorizer {
    pub dim: usize,
    pub model_id: String,
}

impl Default for FakeVectorizer {
    fn default() -> Self {
        Self {
            dim: 8,
            model_id: "fake-v1".to_string(),
        }
    }
}

#[async_trait]
impl Vectorizer for FakeVectorizer {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut values = vec![0.0f32; self.dim];
        for (i, byte) in text.bytes().enumerate() {
            values[i % self.dim] += byte as f32;
        }
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in values.iter_mut() {
                *v /= norm;
            }
        }
        Ok(Embedding::new(self.model_id.clone(), values))
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[derive(Default)]
pub struct FakeRequestLogStore {
    rows: Mutex<HashMap<String, PendingMessage>>,
}

#[async_trait]
impl RequestLogStore for FakeRequestLogStore {
    async fn insert(&self, message: &PendingMessage) -> Result<()> {
        let mut rows = self.rows.lock();
        rows.entry(message.message_id.clone())
            .or_insert_with(|| message.clone());
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<PendingMessage>> {
        Ok(self.rows.lock().get(message_id).cloned())
    }

    async fn find_pending(
        &self,
        user_id: Option<&str>,
        group_id: Option<&str>,
        statuses: &[SyncStatus],
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<PendingMessage>> {
        let rows = self.rows.lock();
        let mut matched: Vec<PendingMessage> = rows
            .values()
            .filter(|m| statuses.iter().any(|s| std::mem::discriminant(s) == std::mem::discriminant(&m.status)))
            .filter(|m| user_id.map(|u| m.sender_id == u).unwrap_or(true))
            .filter(|m| group_id.map(|g| m.group_id.as_deref() == Some(g)).unwrap_or(true))
            .cloned()
            .collect();
        matched.sort_by_key(|m| m.created_at);
        if order == SortOrder::Descending {
            matched.reverse();
        }
        matched.truncate(limit);
        Ok(matched)
    }

    async fn mark_status(&self, message_ids: &[String], new_status: SyncStatus) -> Result<()> {
        let mut rows = self.rows.lock();
        for id in message_ids {
            if let Some(m) = rows.get_mut(id) {
                m.status = new_status;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMemCellStore {
    rows: Mutex<HashMap<String, MemCell>>,
}

#[async_trait]
impl MemCellStore for FakeMemCellStore {
    async fn insert(&self, cell: &MemCell) -> Result<()> {
        self.rows.lock().insert(cell.event_id.clone(), cell.clone());
        Ok(())
    }

    async fn get(&self, event_id: &str) -> Result<Option<MemCell>> {
        Ok(self.rows.lock().get(event_id).cloned())
    }

    async fn delete(&self, event_id: &str) -> Result<()> {
        self.rows.lock().remove(event_id);
        Ok(())
    }

    async fn list_for_group(
        &self,
        group_id: &str,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        limit: usize,
    ) -> Result<Vec<MemCell>> {
        let rows = self.rows.lock();
        let mut out: Vec<MemCell> = rows
            .values()
            .filter(|c| c.group_id.as_deref() == Some(group_id))
            .filter(|c| range.map(|(s, e)| c.timestamp >= s && c.timestamp <= e).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by_key(|c| c.timestamp);
        out.truncate(limit);
        Ok(out)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<MemCell>> {
        let rows = self.rows.lock();
        let mut out: Vec<MemCell> = rows
            .values()
            .filter(|c| c.group_id.as_deref() == Some(group_id))
            .filter(|c| c.participants.contains(user_id))
            .cloned()
            .collect();
        out.sort_by_key(|c| c.timestamp);
        out.reverse();
        out.truncate(limit);
        Ok(out)
    }
}

#[derive(Default)]
pub struct FakeProfileStore {
    rows: Mutex<Vec<Profile>>,
}

#[async_trait]
impl ProfileStore for FakeProfileStore {
    async fn insert(&self, profile: &Profile) -> Result<()> {
        self.rows.lock().push(profile.clone());
        Ok(())
    }

    async fn get_latest(&self, user_id: &str, group_id: &str) -> Result<Option<Profile>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|p| p.user_id == user_id && p.group_id == group_id && p.is_latest)
            .cloned()
            .next())
    }

    async fn set_latest(&self, user_id: &str, group_id: &str, version: &str) -> Result<()> {
        let mut rows = self.rows.lock();
        for p in rows.iter_mut() {
            if p.user_id == user_id && p.group_id == group_id {
                p.is_latest = p.version == version;
            }
        }
        Ok(())
    }

    async fn ensure_latest(&self, user_id: &str, group_id: &str) -> Result<()> {
        let mut rows = self.rows.lock();
        let max_seq = rows
            .iter()
            .filter(|p| p.user_id == user_id && p.group_id == group_id)
            .map(|p| p.sequence)
            .max();
        if let Some(max_seq) = max_seq {
            for p in rows.iter_mut() {
                if p.user_id == user_id && p.group_id == group_id {
                    p.is_latest = p.sequence == max_seq;
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeClusterStateStore {
    rows: Mutex<HashMap<String, ClusterState>>,
}

#[async_trait]
impl ClusterStateStore for FakeClusterStateStore {
    async fn load(&self, group_id: &str) -> Result<Option<ClusterState>> {
        Ok(self.rows.lock().get(group_id).cloned())
    }

    async fn save(&self, state: &ClusterState) -> Result<()> {
        self.rows.lock().insert(state.group_id.clone(), state.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAtomicEventStore {
    rows: Mutex<HashMap<String, AtomicEvent>>,
}

#[async_trait]
impl AtomicEventStore for FakeAtomicEventStore {
    async fn insert(&self, event: &AtomicEvent) -> Result<()> {
        self.rows.lock().insert(event.log_id.clone(), event.clone());
        Ok(())
    }

    async fn delete(&self, log_id: &str) -> Result<()> {
        self.rows.lock().remove(log_id);
        Ok(())
    }

    async fn list_for_parent(&self, parent_event_id: &str) -> Result<Vec<AtomicEvent>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|e| e.parent_event_id == parent_event_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeSemanticMemoryStore {
    rows: Mutex<HashMap<String, SemanticMemory>>,
}

#[async_trait]
impl SemanticMemoryStore for FakeSemanticMemoryStore {
    async fn insert(&self, memory: &SemanticMemory) -> Result<()> {
        self.rows.lock().insert(memory.memory_id.clone(), memory.clone());
        Ok(())
    }

    async fn delete(&self, memory_id: &str) -> Result<()> {
        self.rows.lock().remove(memory_id);
        Ok(())
    }

    async fn list_for_parent(&self, parent_event_id: &str) -> Result<Vec<SemanticMemory>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|m| m.parent_event_id == parent_event_id)
            .cloned()
            .collect())
    }

    async fn list_holding_at(
        &self,
        user_id: Option<&str>,
        group_id: Option<&str>,
        t: DateTime<Utc>,
    ) -> Result<Vec<SemanticMemory>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|m| user_id.map(|u| m.user_id.as_deref() == Some(u)).unwrap_or(true))
            .filter(|m| group_id.map(|g| m.group_id.as_deref() == Some(g)).unwrap_or(true))
            .filter(|m| m.holds_at(t))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeConversationMetaStore {
    rows: Mutex<HashMap<String, ConversationMeta>>,
}

#[async_trait]
impl ConversationMetaStore for FakeConversationMetaStore {
    async fn upsert(&self, meta: &ConversationMeta) -> Result<()> {
        self.rows.lock().insert(meta.group_id.clone(), meta.clone());
        Ok(())
    }

    async fn get(&self, group_id: &str) -> Result<Option<ConversationMeta>> {
        Ok(self.rows.lock().get(group_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeConversationStatusStore {
    rows: Mutex<HashMap<String, ConversationStatus>>,
}

#[async_trait]
impl ConversationStatusStore for FakeConversationStatusStore {
    async fn get(&self, group_id: &str) -> Result<Option<ConversationStatus>> {
        Ok(self.rows.lock().get(group_id).cloned())
    }

    async fn upsert(&self, status: &ConversationStatus) -> Result<()> {
        self.rows.lock().insert(status.group_id.clone(), status.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLexicalIndex {
    records: Mutex<HashMap<String, IndexRecord>>,
}

#[async_trait]
impl LexicalIndex for FakeLexicalIndex {
    async fn bulk_index(&self, records: &[IndexRecord]) -> Result<()> {
        let mut store = self.records.lock();
        for r in records {
            store.insert(r.id.clone(), r.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        filter: &ScopeFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredHit>> {
        let q_terms: Vec<String> = query.to_lowercase().split_whitespace().map(String::from).collect();
        let store = self.records.lock();
        let mut hits: Vec<ScoredHit> = store
            .values()
            .filter(|r| r.matches_scope(filter))
            .filter_map(|r| {
                let text = r.primary_text.to_lowercase();
                let score = q_terms.iter().filter(|t| text.contains(t.as_str())).count() as f32;
                if score > 0.0 {
                    Some(ScoredHit {
                        record: r.clone(),
                        score,
                        source: SearchSource::Bm25,
                        rank: 0,
                    })
                } else {
                    None
                }
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        for (i, h) in hits.iter_mut().enumerate() {
            h.rank = i;
        }
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut store = self.records.lock();
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeVectorIndex {
    records: Mutex<HashMap<String, IndexRecord>>,
}

#[async_trait]
impl VectorIndex for FakeVectorIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        let mut store = self.records.lock();
        for r in records {
            store.insert(r.id.clone(), r.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &Embedding,
        filter: &ScopeFilter,
        top_k: usize,
        radius: Option<f32>,
    ) -> Result<Vec<ScoredHit>> {
        let store = self.records.lock();
        let mut hits: Vec<ScoredHit> = store
            .values()
            .filter(|r| r.matches_scope(filter))
            .filter_map(|r| {
                let emb = r.embedding.as_ref()?;
                let score = query.cosine(emb);
                if radius.map(|rad| score < rad).unwrap_or(false) {
                    return None;
                }
                Some(ScoredHit {
                    record: r.clone(),
                    score,
                    source: SearchSource::Embedding,
                    rank: 0,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        for (i, h) in hits.iter_mut().enumerate() {
            h.rank = i;
        }
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut store = self.records.lock();
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }
}
