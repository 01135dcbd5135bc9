//! C9 — Memory Extractor (§4.4): given a freshly promoted `MemCell`,
//! derives `AtomicEvent`s, `SemanticMemory`s, and `ProfileDelta`s via
//! three independent, schema-validated LLM calls.
//!
//! The three calls are issued concurrently with `tokio::join!`,
//! mirroring `crates/rag/src/retriever.rs`'s dense/sparse dispatch —
//! a failure in one stream must not block the other two, so each
//! result is collected (and any per-record validation failure
//! dropped, logged, and skipped) independently rather than short-
//! circuited with `?` across the whole batch.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use memoria_config::ExtractionConfig;
use memoria_core::error::Result as CoreResult;
use memoria_core::traits::llm_client::{LlmClient, LlmRequest};
use memoria_core::traits::vectorizer::Vectorizer;
use memoria_core::types::{AtomicEvent, MemCell, SemanticMemory};

/// A per-user trait update accumulated for the episode's participants;
/// not materialized into a `Profile` until the Cluster Manager (§4.6)
/// decides to trigger a rebuild.
#[derive(Debug, Clone)]
pub struct ProfileDelta {
    pub user_id: String,
    pub category: String,
    pub value: String,
    pub evidence: String,
}

#[derive(Debug, Default)]
pub struct ExtractionResult {
    pub atomic_events: Vec<AtomicEvent>,
    pub semantic_memories: Vec<SemanticMemory>,
    pub profile_deltas: Vec<ProfileDelta>,
}

#[derive(Debug, Deserialize)]
struct AtomicEventDraft {
    #[serde(default)]
    event_type: String,
    atomic_fact: String,
    #[serde(default)]
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct AtomicEventsResponse {
    #[serde(default)]
    events: Vec<AtomicEventDraft>,
}

#[derive(Debug, Deserialize)]
struct SemanticMemoryDraft {
    content: String,
    evidence: String,
    start_time: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    end_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct SemanticMemoriesResponse {
    #[serde(default)]
    memories: Vec<SemanticMemoryDraft>,
}

#[derive(Debug, Deserialize)]
struct ProfileDeltaDraft {
    user_id: String,
    category: String,
    value: String,
    evidence: String,
}

#[derive(Debug, Deserialize)]
struct ProfileDeltasResponse {
    #[serde(default)]
    deltas: Vec<ProfileDeltaDraft>,
}

fn atomic_events_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "events": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "event_type": { "type": "string" },
                        "atomic_fact": { "type": "string" },
                        "timestamp": { "type": "string" }
                    },
                    "required": ["atomic_fact"]
                }
            }
        },
        "required": ["events"]
    })
}

fn semantic_memories_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "memories": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "content": { "type": "string" },
                        "evidence": { "type": "string" },
                        "start_time": { "type": "string" },
                        "end_time": { "type": ["string", "null"] }
                    },
                    "required": ["content", "evidence", "start_time"]
                }
            }
        },
        "required": ["memories"]
    })
}

fn profile_deltas_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "deltas": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "user_id": { "type": "string" },
                        "category": { "type": "string" },
                        "value": { "type": "string" },
                        "evidence": { "type": "string" }
                    },
                    "required": ["user_id", "category", "value", "evidence"]
                }
            }
        },
        "required": ["deltas"]
    })
}

pub struct MemoryExtractor {
    llm: Arc<dyn LlmClient>,
    vectorizer: Arc<dyn Vectorizer>,
    config: ExtractionConfig,
}

impl MemoryExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, vectorizer: Arc<dyn Vectorizer>, config: ExtractionConfig) -> Self {
        Self { llm, vectorizer, config }
    }

    pub async fn extract(&self, cell: &MemCell) -> CoreResult<ExtractionResult> {
        let (events, memories, deltas) = tokio::join!(
            self.extract_atomic_events(cell),
            self.extract_semantic_memories(cell),
            self.extract_profile_deltas(cell),
        );

        Ok(ExtractionResult {
            atomic_events: events.unwrap_or_else(|e| {
                tracing::warn!(event_id = %cell.event_id, %e, "atomic event extraction failed");
                Vec::new()
            }),
            semantic_memories: memories.unwrap_or_else(|e| {
                tracing::warn!(event_id = %cell.event_id, %e, "semantic memory extraction failed");
                Vec::new()
            }),
            profile_deltas: deltas.unwrap_or_else(|e| {
                tracing::warn!(event_id = %cell.event_id, %e, "profile delta extraction failed");
                Vec::new()
            }),
        })
    }

    async fn extract_atomic_events(&self, cell: &MemCell) -> CoreResult<Vec<AtomicEvent>> {
        let prompt = format!(
            "Extract a list of self-contained declarative clauses from the episode below. \
             Each must quote or paraphrase the episode content.\n\nEpisode: {}",
            cell.episode
        );
        let response = self.llm.complete(LlmRequest::new(prompt, atomic_events_schema())).await?;
        let parsed: AtomicEventsResponse = serde_json::from_value(response.json).unwrap_or_default();

        let mut events = Vec::with_capacity(parsed.events.len());
        for draft in parsed.events {
            if draft.atomic_fact.trim().is_empty() {
                tracing::warn!(event_id = %cell.event_id, "dropping atomic event with empty fact");
                continue;
            }
            let timestamp = draft.timestamp.unwrap_or(cell.timestamp);
            let slack = chrono::Duration::seconds(self.config.timestamp_slack_secs);
            if (timestamp - cell.timestamp) < -slack || (timestamp - cell.timestamp) > slack {
                tracing::warn!(event_id = %cell.event_id, ?timestamp, "dropping atomic event outside timestamp slack");
                continue;
            }

            let embedding = self.vectorizer.embed(&draft.atomic_fact).await?;
            events.push(AtomicEvent {
                log_id: uuid::Uuid::new_v4().to_string(),
                parent_event_id: cell.event_id.clone(),
                user_id: cell.user_id.clone(),
                group_id: cell.group_id.clone(),
                participants: cell.participants.clone(),
                event_type: if draft.event_type.is_empty() { "fact".to_string() } else { draft.event_type },
                timestamp,
                atomic_fact: draft.atomic_fact,
                embedding,
                created_at: chrono::Utc::now(),
            });
        }
        Ok(events)
    }

    async fn extract_semantic_memories(&self, cell: &MemCell) -> CoreResult<Vec<SemanticMemory>> {
        let prompt = format!(
            "Extract generalized propositions with explicit validity intervals from the episode \
             below (e.g. \"X works at Y from 2024-03 to present\"). Each must carry a literal \
             quote as evidence and a start_time; end_time is null if open-ended.\n\nEpisode: {}",
            cell.episode
        );
        let response = self.llm.complete(LlmRequest::new(prompt, semantic_memories_schema())).await?;
        let parsed: SemanticMemoriesResponse = serde_json::from_value(response.json).unwrap_or_default();

        let mut memories = Vec::with_capacity(parsed.memories.len());
        for draft in parsed.memories {
            if draft.content.trim().is_empty() || draft.evidence.trim().is_empty() {
                tracing::warn!(event_id = %cell.event_id, "dropping semantic memory with empty content/evidence");
                continue;
            }
            if let Some(end) = draft.end_time {
                if draft.start_time > end {
                    tracing::warn!(event_id = %cell.event_id, "dropping semantic memory with start_time after end_time");
                    continue;
                }
            }

            let duration_days = draft.end_time.map(|end| {
                let raw = (end - draft.start_time).num_days();
                let clamped = SemanticMemory::clamp_duration(raw);
                if clamped != raw {
                    tracing::warn!(event_id = %cell.event_id, raw, clamped, "duration_days clipped to sanity ceiling");
                }
                clamped
            });

            let embedding = self.vectorizer.embed(&draft.content).await?;
            memories.push(SemanticMemory {
                memory_id: uuid::Uuid::new_v4().to_string(),
                parent_event_id: cell.event_id.clone(),
                user_id: cell.user_id.clone(),
                group_id: cell.group_id.clone(),
                content: draft.content,
                evidence: draft.evidence,
                start_time: draft.start_time,
                end_time: draft.end_time,
                duration_days,
                embedding,
                created_at: chrono::Utc::now(),
            });
        }
        Ok(memories)
    }

    async fn extract_profile_deltas(&self, cell: &MemCell) -> CoreResult<Vec<ProfileDelta>> {
        let prompt = format!(
            "Extract per-participant trait updates (category, value, evidence) from the episode \
             below. Only include traits with direct textual support.\n\nParticipants: {:?}\n\nEpisode: {}",
            cell.participants, cell.episode
        );
        let response = self.llm.complete(LlmRequest::new(prompt, profile_deltas_schema())).await?;
        let parsed: ProfileDeltasResponse = serde_json::from_value(response.json).unwrap_or_default();

        let deltas = parsed
            .deltas
            .into_iter()
            .filter(|d| {
                let valid = !d.user_id.trim().is_empty()
                    && !d.category.trim().is_empty()
                    && !d.value.trim().is_empty()
                    && !d.evidence.trim().is_empty();
                if !valid {
                    tracing::warn!(event_id = %cell.event_id, "dropping profile delta with empty field");
                }
                valid
            })
            .map(|d| ProfileDelta {
                user_id: d.user_id,
                category: d.category,
                value: d.value,
                evidence: d.evidence,
            })
            .collect();
        Ok(deltas)
    }
}

impl Default for AtomicEventsResponse {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}
impl Default for SemanticMemoriesResponse {
    fn default() -> Self {
        Self { memories: Vec::new() }
    }
}
impl Default for ProfileDeltasResponse {
    fn default() -> Self {
        Self { deltas: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::test_support::{FakeVectorizer, StubLlmClient};
    use memoria_core::types::Embedding;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn cell() -> MemCell {
        let now = chrono::Utc::now();
        MemCell {
            event_id: "e1".to_string(),
            group_id: Some("g1".to_string()),
            user_id: None,
            participants: BTreeSet::from(["u1".to_string()]),
            timestamp: now,
            subject: "s".to_string(),
            summary: "s".to_string(),
            episode: "user said hi".to_string(),
            original_data: Vec::new(),
            embedding: Embedding::new("m", vec![0.1]),
            r#type: "episode".to_string(),
            keywords: Vec::new(),
            linked_entities: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn extract_runs_all_three_streams_concurrently_and_drops_invalid_records() {
        let llm = Arc::new(StubLlmClient::new(vec![
            json!({ "events": [{ "atomic_fact": "said hi" }, { "atomic_fact": "" }] }),
            json!({ "memories": [] }),
            json!({ "deltas": [{ "user_id": "u1", "category": "mood", "value": "friendly", "evidence": "said hi" }] }),
        ]));
        let extractor = MemoryExtractor::new(llm, Arc::new(FakeVectorizer::default()), ExtractionConfig::default());
        let result = extractor.extract(&cell()).await.unwrap();

        assert_eq!(result.atomic_events.len(), 1);
        assert_eq!(result.atomic_events[0].atomic_fact, "said hi");
        assert!(result.semantic_memories.is_empty());
        assert_eq!(result.profile_deltas.len(), 1);
    }

    #[tokio::test]
    async fn a_failing_stream_does_not_block_the_others() {
        let llm = Arc::new(StubLlmClient::new(vec![
            json!("not an object"),
            json!({ "memories": [{ "content": "likes tea", "evidence": "I like tea", "start_time": chrono::Utc::now().to_rfc3339() }] }),
            json!({ "deltas": [] }),
        ]));
        let extractor = MemoryExtractor::new(llm, Arc::new(FakeVectorizer::default()), ExtractionConfig::default());
        let result = extractor.extract(&cell()).await.unwrap();

        assert!(result.atomic_events.is_empty());
        assert_eq!(result.semantic_memories.len(), 1);
    }
}
