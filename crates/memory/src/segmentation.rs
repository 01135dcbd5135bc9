//! C8 — Segmentation Engine (§4.3): given a window of pending
//! messages, decide whether there is an episode boundary and where.
//!
//! Grounded on the reference workspace's `agentic.rs` control loop
//! (bounded iterative retry over a schema-validated LLM call, with a
//! `validate()` step distinct from the LLM call itself) — generalized
//! here from "is retrieval sufficient" to "is there an episode
//! boundary". Like the Cluster Manager (C10), this is a pure
//! computation: it returns the decision and a freshly built `MemCell`
//! on a boundary; persisting it, flipping `sync_status`, and trimming
//! the Conversation Queue is the Memorize Worker's (C12) job, so the
//! engine itself carries no store dependency.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use memoria_config::SegmentationConfig;
use memoria_core::error::{Error as CoreError, Result as CoreResult};
use memoria_core::traits::llm_client::{LlmClient, LlmRequest};
use memoria_core::traits::vectorizer::Vectorizer;
use memoria_core::types::{MemCell, PendingMessage};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
enum SegmentationResponse {
    NoBoundary,
    Boundary {
        split_index: usize,
        subject: String,
        summary: String,
        episode: String,
        #[serde(default)]
        participants: Vec<String>,
        #[serde(default)]
        keywords: Vec<String>,
    },
}

fn segmentation_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "decision": { "type": "string", "enum": ["no_boundary", "boundary"] },
            "split_index": { "type": "integer" },
            "subject": { "type": "string" },
            "summary": { "type": "string" },
            "episode": { "type": "string" },
            "participants": { "type": "array", "items": { "type": "string" } },
            "keywords": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["decision"]
    })
}

pub enum SegmentationOutcome {
    NoBoundary,
    Boundary {
        cell: MemCell,
        /// `message_id`s of the promoted prefix — sync_status -> 1.
        consumed_ids: Vec<String>,
        /// `message_id`s of the retained suffix — sync_status stays 0.
        retained_ids: Vec<String>,
    },
}

pub struct SegmentationEngine {
    llm: Arc<dyn LlmClient>,
    vectorizer: Arc<dyn Vectorizer>,
    config: SegmentationConfig,
}

impl SegmentationEngine {
    pub fn new(llm: Arc<dyn LlmClient>, vectorizer: Arc<dyn Vectorizer>, config: SegmentationConfig) -> Self {
        Self { llm, vectorizer, config }
    }

    /// `group_id` is the conversation's true group identifier —
    /// `None` for a personal (no-group) stream. `window_key` is the
    /// Conversation Queue/Request Log partition key the caller
    /// resolved this window under (the group_id itself, or the
    /// sender_id substitute the Memorize Worker uses for personal
    /// streams) — used only for tracing and as the owning user's id
    /// when `group_id` is `None`.
    pub async fn segment(
        &self,
        group_id: Option<&str>,
        window_key: &str,
        window: &[PendingMessage],
    ) -> CoreResult<SegmentationOutcome> {
        if window.len() < self.config.min_window {
            return Ok(SegmentationOutcome::NoBoundary);
        }

        let span = window.last().unwrap().created_at - window.first().unwrap().created_at;
        if span.num_seconds() < self.config.min_span_secs as i64 {
            return Ok(SegmentationOutcome::NoBoundary);
        }

        let packed = self.pack_window(window);

        let mut strict = false;
        let mut last_err = CoreError::ExtractionError("segmentation never attempted".into());

        for attempt in 0..=self.config.max_retries {
            let prompt = self.build_prompt(&packed, strict);
            let response = self
                .llm
                .complete(LlmRequest::new(prompt, segmentation_schema()))
                .await?;

            match serde_json::from_value::<SegmentationResponse>(response.json) {
                Ok(parsed) => match self.validate(parsed, window) {
                    Ok(ValidatedDecision::NoBoundary) => return Ok(SegmentationOutcome::NoBoundary),
                    Ok(ValidatedDecision::Boundary {
                        subject,
                        summary,
                        episode,
                        participants,
                        keywords,
                        consumed,
                        retained,
                    }) => {
                        let embedding = self.vectorizer.embed(&episode).await?;
                        let now = chrono::Utc::now();
                        let cell = MemCell {
                            event_id: uuid::Uuid::new_v4().to_string(),
                            group_id: group_id.map(|g| g.to_string()),
                            user_id: group_id.is_none().then(|| window_key.to_string()),
                            participants: participants.into_iter().collect(),
                            timestamp: consumed.last().unwrap().created_at,
                            subject,
                            summary,
                            episode,
                            original_data: consumed.clone(),
                            embedding,
                            r#type: "episode".to_string(),
                            keywords,
                            linked_entities: Vec::new(),
                            created_at: now,
                            updated_at: now,
                        };
                        return Ok(SegmentationOutcome::Boundary {
                            cell,
                            consumed_ids: consumed.iter().map(|m| m.message_id.clone()).collect(),
                            retained_ids: retained.iter().map(|m| m.message_id.clone()).collect(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(window_key, attempt, %e, "segmentation validation failed, retrying");
                        last_err = CoreError::ExtractionError(e);
                        strict = true;
                    }
                },
                Err(e) => {
                    tracing::warn!(window_key, attempt, %e, "segmentation response not schema-shaped, retrying");
                    last_err = CoreError::ExtractionError(e.to_string());
                    strict = true;
                }
            }
        }

        Err(last_err)
    }

    /// Joins the window into a prompt-ready transcript, dropping the
    /// oldest messages first once the packed text would exceed
    /// `max_tokens` (approximated as 4 characters per token).
    fn pack_window(&self, window: &[PendingMessage]) -> Vec<&PendingMessage> {
        let budget_chars = self.config.max_tokens * 4;
        let mut packed: Vec<&PendingMessage> = window.iter().collect();
        let mut total: usize = packed.iter().map(|m| m.content.len()).sum();
        while total > budget_chars && packed.len() > 1 {
            let dropped = packed.remove(0);
            total -= dropped.content.len();
        }
        packed
    }

    fn build_prompt(&self, packed: &[&PendingMessage], strict: bool) -> String {
        let transcript = packed
            .iter()
            .enumerate()
            .map(|(i, m)| format!("[{}] {}: {}", i + 1, m.sender_id, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = format!(
            "Below is a window of messages, 1-indexed. Decide whether a topical boundary \
             exists: a prefix that forms a complete, coherent episode. If so return \
             decision=\"boundary\" with split_index = the last index in the prefix (1-indexed), \
             a subject, a summary, a paraphrased episode narrative, the list of participant \
             sender ids in the prefix, and keywords. Otherwise return \
             decision=\"no_boundary\".\n\n{transcript}"
        );
        if strict {
            prompt.push_str(
                "\n\nYour previous response was invalid: split_index must be within range, \
                 subject/summary/episode must be non-empty, and participants must be a subset \
                 of the senders in the prefix. Try again.",
            );
        }
        prompt
    }

    fn validate(
        &self,
        response: SegmentationResponse,
        window: &[PendingMessage],
    ) -> Result<ValidatedDecision, String> {
        let (split_index, subject, summary, episode, participants, keywords) = match response {
            SegmentationResponse::NoBoundary => return Ok(ValidatedDecision::NoBoundary),
            SegmentationResponse::Boundary {
                split_index,
                subject,
                summary,
                episode,
                participants,
                keywords,
            } => (split_index, subject, summary, episode, participants, keywords),
        };

        if split_index < 1 || split_index > window.len() {
            return Err(format!("split_index {split_index} out of range [1, {}]", window.len()));
        }
        if subject.trim().is_empty() || summary.trim().is_empty() || episode.trim().is_empty() {
            return Err("subject, summary, and episode must be non-empty".to_string());
        }

        let prefix = &window[..split_index];
        let senders: BTreeSet<&str> = prefix.iter().map(|m| m.sender_id.as_str()).collect();
        if !participants.iter().all(|p| senders.contains(p.as_str())) {
            return Err("participants must be a subset of the prefix's senders".to_string());
        }

        Ok(ValidatedDecision::Boundary {
            subject,
            summary,
            episode,
            participants,
            keywords,
            consumed: prefix.to_vec(),
            retained: window[split_index..].to_vec(),
        })
    }
}

enum ValidatedDecision {
    NoBoundary,
    Boundary {
        subject: String,
        summary: String,
        episode: String,
        participants: Vec<String>,
        keywords: Vec<String>,
        consumed: Vec<PendingMessage>,
        retained: Vec<PendingMessage>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memoria_core::test_support::{FakeVectorizer, StubLlmClient};
    use memoria_core::types::MessageRole;
    use serde_json::json;

    fn msg(id: &str, sender: &str, offset_secs: i64) -> PendingMessage {
        PendingMessage::new(id, sender, MessageRole::User, "hi", Utc::now() + chrono::Duration::seconds(offset_secs))
    }

    #[tokio::test]
    async fn below_min_window_returns_no_boundary_without_calling_llm() {
        let llm = Arc::new(StubLlmClient::new(vec![]));
        let engine = SegmentationEngine::new(llm, Arc::new(FakeVectorizer::default()), SegmentationConfig::default());
        let window = vec![msg("1", "u1", 0)];
        let outcome = engine.segment(Some("g1"), "g1", &window).await.unwrap();
        assert!(matches!(outcome, SegmentationOutcome::NoBoundary));
    }

    #[tokio::test]
    async fn valid_boundary_produces_memcell_with_subset_participants() {
        let llm = Arc::new(StubLlmClient::new(vec![json!({
            "decision": "boundary",
            "split_index": 2,
            "subject": "greeting",
            "summary": "they said hello",
            "episode": "a short greeting exchange",
            "participants": ["u1"],
            "keywords": ["greeting"]
        })]));
        let config = SegmentationConfig {
            min_window: 1,
            min_span_secs: 0,
            ..SegmentationConfig::default()
        };
        let engine = SegmentationEngine::new(llm, Arc::new(FakeVectorizer::default()), config);
        let window = vec![msg("1", "u1", 0), msg("2", "u1", 100), msg("3", "u2", 200)];

        let outcome = engine.segment(Some("g1"), "g1", &window).await.unwrap();
        match outcome {
            SegmentationOutcome::Boundary { cell, consumed_ids, retained_ids } => {
                assert_eq!(consumed_ids, vec!["1", "2"]);
                assert_eq!(retained_ids, vec!["3"]);
                assert!(cell.participants_valid());
                assert_eq!(cell.group_id.as_deref(), Some("g1"));
                assert_eq!(cell.user_id, None);
            }
            SegmentationOutcome::NoBoundary => panic!("expected a boundary"),
        }
    }

    #[tokio::test]
    async fn personal_stream_tags_user_id_instead_of_group_id() {
        let llm = Arc::new(StubLlmClient::new(vec![json!({
            "decision": "boundary",
            "split_index": 2,
            "subject": "greeting",
            "summary": "they said hello",
            "episode": "a short greeting exchange",
            "participants": ["u1"],
            "keywords": ["greeting"]
        })]));
        let config = SegmentationConfig {
            min_window: 1,
            min_span_secs: 0,
            ..SegmentationConfig::default()
        };
        let engine = SegmentationEngine::new(llm, Arc::new(FakeVectorizer::default()), config);
        let window = vec![msg("1", "u1", 0), msg("2", "u1", 100)];

        let outcome = engine.segment(None, "u1", &window).await.unwrap();
        match outcome {
            SegmentationOutcome::Boundary { cell, .. } => {
                assert_eq!(cell.group_id, None);
                assert_eq!(cell.user_id.as_deref(), Some("u1"));
            }
            SegmentationOutcome::NoBoundary => panic!("expected a boundary"),
        }
    }

    #[tokio::test]
    async fn participants_outside_prefix_senders_fails_validation() {
        let llm = Arc::new(StubLlmClient::new(vec![json!({
            "decision": "boundary",
            "split_index": 1,
            "subject": "s",
            "summary": "s",
            "episode": "e",
            "participants": ["u2"],
            "keywords": []
        })]));
        let config = SegmentationConfig {
            min_window: 1,
            min_span_secs: 0,
            max_retries: 0,
            ..SegmentationConfig::default()
        };
        let engine = SegmentationEngine::new(llm, Arc::new(FakeVectorizer::default()), config);
        let window = vec![msg("1", "u1", 0)];
        assert!(engine.segment(Some("g1"), "g1", &window).await.is_err());
    }
}
