//! C14 — agentic retrieval (§4.9, "Agentic retrieval"). Round-1 RRF,
//! LLM sufficiency judge, parallel round-2 fan-out over every refined
//! query, re-fuse. Grounded on the reference workspace's
//! `AgenticRetriever`/`SufficiencyChecker`/`LlmSufficiencyChecker`/
//! `QueryRewriter` (`crates/rag/src/agentic.rs`), widened per §4.9 step
//! 4: the judge schema carries plural `refined_queries` rather than a
//! single rewritten query, and round-2 issues every one of them in
//! parallel before a single re-fuse rather than looping one rewrite at
//! a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;

use memoria_core::error::{Error as CoreError, Result as CoreResult};
use memoria_core::traits::llm_client::{LlmClient, LlmRequest};
use memoria_core::types::{ScopeFilter, ScoredHit, SearchSource, TimeRange};

use crate::retriever::{RetrievalEngine, RetrieveRequest};

#[derive(Debug, Clone, Deserialize)]
struct JudgeResponse {
    is_sufficient: bool,
    reasoning: String,
    #[serde(default)]
    missing_information: Vec<String>,
    #[serde(default)]
    refined_queries: Vec<String>,
}

fn judge_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "is_sufficient": { "type": "boolean" },
            "reasoning": { "type": "string" },
            "missing_information": { "type": "array", "items": { "type": "string" } },
            "refined_queries": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["is_sufficient", "reasoning", "missing_information", "refined_queries"]
    })
}

#[derive(Debug, Clone, Default)]
pub struct AgenticMetadata {
    pub is_multi_round: bool,
    pub is_sufficient: Option<bool>,
    pub reasoning: Option<String>,
    pub refined_queries: Vec<String>,
    pub round1_count: usize,
    pub round2_count: Option<usize>,
    pub total_latency_ms: u64,
    /// Set when round-2 was cancelled by the deadline and round-1's
    /// results were returned instead (§4.9 cancellation clause).
    pub round2_expired: bool,
}

pub struct AgenticResult {
    pub hits: Vec<ScoredHit>,
    pub metadata: AgenticMetadata,
}

pub struct AgenticRequest {
    pub query: String,
    pub data_source: memoria_core::types::DataSource,
    pub filter: ScopeFilter,
    pub top_k: usize,
    pub max_rounds: u32,
    pub deadline: Duration,
    /// Applied to both round-1 and every round-2 fan-out query; the
    /// composition root derives this from its `time_range_days` input.
    pub time_range: Option<TimeRange>,
}

pub struct AgenticRetriever {
    engine: Arc<RetrievalEngine>,
    llm: Arc<dyn LlmClient>,
}

impl AgenticRetriever {
    pub fn new(engine: Arc<RetrievalEngine>, llm: Arc<dyn LlmClient>) -> Self {
        Self { engine, llm }
    }

    pub async fn retrieve(&self, req: AgenticRequest) -> CoreResult<AgenticResult> {
        let started = Instant::now();

        let round1 = self
            .engine
            .retrieve(RetrieveRequest {
                query: req.query.clone(),
                data_source: req.data_source,
                mode: memoria_core::types::RetrievalMode::Rrf,
                filter: req.filter.clone(),
                top_k: req.top_k,
                time_range: req.time_range,
                radius: None,
            })
            .await?;

        if req.max_rounds <= 1 {
            return Ok(AgenticResult {
                metadata: AgenticMetadata {
                    round1_count: round1.len(),
                    total_latency_ms: elapsed_ms(started),
                    ..Default::default()
                },
                hits: round1,
            });
        }

        let remaining = req.deadline.checked_sub(started.elapsed()).unwrap_or_default();
        let judgement = tokio::time::timeout(remaining, self.judge(&req.query, &round1)).await;

        let judgement = match judgement {
            Ok(result) => result?,
            Err(_) => {
                return Ok(AgenticResult {
                    metadata: AgenticMetadata {
                        round1_count: round1.len(),
                        total_latency_ms: elapsed_ms(started),
                        round2_expired: true,
                        ..Default::default()
                    },
                    hits: round1,
                });
            },
        };

        if judgement.is_sufficient || judgement.refined_queries.is_empty() {
            return Ok(AgenticResult {
                metadata: AgenticMetadata {
                    is_sufficient: Some(judgement.is_sufficient),
                    reasoning: Some(judgement.reasoning),
                    round1_count: round1.len(),
                    total_latency_ms: elapsed_ms(started),
                    ..Default::default()
                },
                hits: round1,
            });
        }

        let remaining = req.deadline.checked_sub(started.elapsed()).unwrap_or_default();
        let round2_future = self.fan_out_round2(&req, &judgement.refined_queries);

        match tokio::time::timeout(remaining, round2_future).await {
            Ok(round2_lists) => {
                let round2_count: usize = round2_lists.iter().map(Vec::len).sum();
                let fused = fuse_equal_weight(&round1, &round2_lists, req.top_k);
                Ok(AgenticResult {
                    metadata: AgenticMetadata {
                        is_multi_round: true,
                        is_sufficient: Some(false),
                        reasoning: Some(judgement.reasoning),
                        refined_queries: judgement.refined_queries,
                        round1_count: round1.len(),
                        round2_count: Some(round2_count),
                        total_latency_ms: elapsed_ms(started),
                        round2_expired: false,
                    },
                    hits: fused,
                })
            },
            Err(_) => Ok(AgenticResult {
                metadata: AgenticMetadata {
                    is_sufficient: Some(false),
                    reasoning: Some(judgement.reasoning),
                    refined_queries: judgement.refined_queries,
                    round1_count: round1.len(),
                    total_latency_ms: elapsed_ms(started),
                    round2_expired: true,
                    ..Default::default()
                },
                hits: round1,
            }),
        }
    }

    async fn judge(&self, query: &str, round1: &[ScoredHit]) -> CoreResult<JudgeResponse> {
        let context = round1
            .iter()
            .take(10)
            .enumerate()
            .map(|(i, h)| format!("[{}] {}", i + 1, truncate(&h.record.primary_text, 300)))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Evaluate whether the retrieved memories below are sufficient to answer the query.\n\n\
             Query: \"{query}\"\n\nRetrieved memories:\n{context}\n\n\
             Decide if these memories cover the query. If not, propose one or more refined \
             search queries (different phrasings or narrower sub-questions) likely to surface \
             the missing information."
        );

        let response = self
            .llm
            .complete(LlmRequest::new(prompt, judge_schema()))
            .await?;

        serde_json::from_value(response.json)
            .map_err(|e| CoreError::ExtractionError(format!("agentic judge response: {e}")))
    }

    async fn fan_out_round2(&self, req: &AgenticRequest, queries: &[String]) -> Vec<Vec<ScoredHit>> {
        let futures = queries.iter().map(|q| {
            self.engine.retrieve(RetrieveRequest {
                query: q.clone(),
                data_source: req.data_source,
                mode: memoria_core::types::RetrievalMode::Rrf,
                filter: req.filter.clone(),
                top_k: req.top_k,
                time_range: req.time_range,
                radius: None,
            })
        });

        futures::future::join_all(futures)
            .await
            .into_iter()
            .filter_map(|r| r.ok())
            .collect()
    }
}

/// Union round-1 with every round-2 list and re-fuse via RRF, each
/// contributing list (round-1 plus one per refined query) weighted
/// equally (§4.9 step 4).
fn fuse_equal_weight(round1: &[ScoredHit], round2: &[Vec<ScoredHit>], top_k: usize) -> Vec<ScoredHit> {
    const K0: f32 = 60.0;
    let mut scores: std::collections::HashMap<String, (f32, ScoredHit)> =
        std::collections::HashMap::new();

    let all_lists = std::iter::once(round1).chain(round2.iter().map(Vec::as_slice));
    for list in all_lists {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = 1.0 / (K0 + rank as f32 + 1.0);
            scores
                .entry(hit.record.id.clone())
                .and_modify(|(score, existing)| {
                    *score += contribution;
                    existing.source = SearchSource::Rrf;
                })
                .or_insert_with(|| {
                    let mut marked = hit.clone();
                    marked.source = SearchSource::Rrf;
                    (contribution, marked)
                });
        }
    }

    let mut fused: Vec<(f32, ScoredHit)> = scores.into_values().collect();
    fused.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
    fused
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(rank, (score, mut hit))| {
            hit.score = score;
            hit.rank = rank;
            hit
        })
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    match text[..max_len].rfind(char::is_whitespace) {
        Some(idx) => format!("{}...", &text[..idx]),
        None => format!("{}...", &text[..max_len]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memoria_core::types::{DataSource, IndexRecord};
    use std::collections::BTreeSet;

    fn hit(id: &str, rank: usize) -> ScoredHit {
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
            score: 1.0,
            source: SearchSource::Bm25,
            rank,
        }
    }

    #[test]
    fn fuse_equal_weight_boosts_overlap_across_three_lists() {
        let round1 = vec![hit("a", 0), hit("b", 1)];
        let round2 = vec![vec![hit("a", 0), hit("c", 1)], vec![hit("a", 0)]];

        let fused = fuse_equal_weight(&round1, &round2, 10);
        assert_eq!(fused[0].record.id, "a");
        assert_eq!(fused[0].source, SearchSource::Rrf);
    }

    #[test]
    fn truncate_respects_word_boundary() {
        let truncated = truncate("one two three four", 9);
        assert!(truncated.ends_with("..."));
        assert!(!truncated.contains("four"));
    }
}
