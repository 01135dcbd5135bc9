//! C11 — Profile Manager (§4.6). Merges newly extracted
//! `ProfileDelta`s into a user's latest `Profile` via an LLM rewrite,
//! then persists the new version and repairs `is_latest` flags.
//!
//! The merge-and-rewrite call is schema-validated with the same
//! bounded-retry idiom as the Segmentation Engine (C8) and
//! `crates/llm/src/ollama.rs`'s retry-with-corrective-prompt loop.
//! Per §5, this is the one component in the ingest pipeline that
//! needs a real mutex: two concurrent rebuilds for the same
//! `(user_id, group_id)` must be serialized or the slower writer's
//! `ensure_latest` call can stomp on the faster one's row. The lock is
//! sharded per key via a `DashMap<(user, group), Mutex<()>>` registry,
//! the same per-key-locking idiom as the Conversation Queue (C6).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use memoria_config::ProfileConfig;
use memoria_core::error::{Error as CoreError, Result as CoreResult};
use memoria_core::traits::llm_client::{LlmClient, LlmRequest};
use memoria_core::traits::store::ProfileStore;
use memoria_core::types::{Profile, ProfilePayload, TraitEntry};

use crate::extractor::ProfileDelta;

#[derive(Debug, Deserialize)]
struct MergedTraitEntry {
    value: String,
    #[serde(default)]
    evidences: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MergeResponse {
    #[serde(default)]
    traits: HashMap<String, Vec<MergedTraitEntry>>,
}

fn merge_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "traits": {
                "type": "object",
                "additionalProperties": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "value": { "type": "string" },
                            "evidences": { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["value"]
                    }
                }
            }
        },
        "required": ["traits"]
    })
}

pub struct ProfileManager {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn ProfileStore>,
    config: ProfileConfig,
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl ProfileManager {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn ProfileStore>, config: ProfileConfig) -> Self {
        Self {
            llm,
            store,
            config,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user_id: &str, group_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((user_id.to_string(), group_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Rebuilds `user_id`'s profile within `group_id` by folding
    /// `deltas` into the current latest payload via an LLM rewrite.
    /// Serialized per `(user_id, group_id)` so two concurrent rebuilds
    /// never race on `ensure_latest`.
    pub async fn rebuild(&self, user_id: &str, group_id: &str, deltas: &[ProfileDelta]) -> CoreResult<Profile> {
        let lock = self.lock_for(user_id, group_id);
        let _guard = lock.lock().await;

        let previous = self.store.get_latest(user_id, group_id).await?;
        let merged = self.merge(previous.as_ref(), deltas).await?;

        let sequence = previous.as_ref().map(|p| p.sequence + 1).unwrap_or(0);
        let version = Profile::next_version(previous.as_ref().map(|p| p.version.as_str()), sequence);

        let profile = Profile {
            user_id: user_id.to_string(),
            group_id: group_id.to_string(),
            version,
            sequence,
            is_latest: true,
            payload: merged,
            created_at: chrono::Utc::now(),
        };

        self.store.insert(&profile).await?;
        self.store.ensure_latest(user_id, group_id).await?;
        Ok(profile)
    }

    async fn merge(&self, previous: Option<&Profile>, deltas: &[ProfileDelta]) -> CoreResult<ProfilePayload> {
        let previous_json = previous
            .map(|p| serde_json::to_string(&p.payload.0).unwrap_or_default())
            .unwrap_or_else(|| "{}".to_string());
        let deltas_desc = deltas
            .iter()
            .map(|d| format!("- [{}] {} = {} (evidence: {})", d.user_id, d.category, d.value, d.evidence))
            .collect::<Vec<_>>()
            .join("\n");

        let mut strict = false;
        let mut last_err = CoreError::ExtractionError("profile merge never attempted".into());

        for attempt in 0..=self.config.max_retries {
            let mut prompt = format!(
                "Merge the new trait updates below into the existing profile. Keep traits that \
                 aren't contradicted, update the ones that are, and keep every value's evidence \
                 quotes. Respond with the full resulting set of traits under \"traits\".\n\n\
                 Existing profile (JSON): {previous_json}\n\nNew updates:\n{deltas_desc}"
            );
            if strict {
                prompt.push_str(
                    "\n\nYour previous response was invalid JSON for this schema. Return only \
                     the \"traits\" object, one array of {value, evidences} per category.",
                );
            }

            let response = self.llm.complete(LlmRequest::new(prompt, merge_schema())).await?;
            match serde_json::from_value::<MergeResponse>(response.json) {
                Ok(parsed) => {
                    let payload = parsed
                        .traits
                        .into_iter()
                        .map(|(category, entries)| {
                            let entries = entries
                                .into_iter()
                                .map(|e| TraitEntry {
                                    value: e.value,
                                    evidences: e.evidences,
                                })
                                .collect();
                            (category, entries)
                        })
                        .collect();
                    return Ok(ProfilePayload(payload));
                }
                Err(e) => {
                    tracing::warn!(attempt, %e, "profile merge response not schema-shaped, retrying");
                    last_err = CoreError::ExtractionError(e.to_string());
                    strict = true;
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::test_support::{FakeProfileStore, StubLlmClient};
    use serde_json::json;

    fn delta(user_id: &str, category: &str, value: &str) -> ProfileDelta {
        ProfileDelta {
            user_id: user_id.to_string(),
            category: category.to_string(),
            value: value.to_string(),
            evidence: "said so".to_string(),
        }
    }

    #[tokio::test]
    async fn first_rebuild_has_no_previous_and_sequence_zero() {
        let llm = Arc::new(StubLlmClient::new(vec![json!({
            "traits": { "mood": [{ "value": "friendly", "evidences": ["said hi"] }] }
        })]));
        let store = Arc::new(FakeProfileStore::default());
        let manager = ProfileManager::new(llm, store.clone(), ProfileConfig::default());

        let profile = manager.rebuild("u1", "g1", &[delta("u1", "mood", "friendly")]).await.unwrap();
        assert_eq!(profile.sequence, 0);
        assert_eq!(profile.version, "0");
        assert!(profile.is_latest);
        assert!(store.get_latest("u1", "g1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_rebuild_chains_version_off_the_previous() {
        let llm = Arc::new(StubLlmClient::new(vec![
            json!({ "traits": { "mood": [{ "value": "friendly", "evidences": [] }] } }),
            json!({ "traits": { "mood": [{ "value": "excited", "evidences": [] }] } }),
        ]));
        let store = Arc::new(FakeProfileStore::default());
        let manager = ProfileManager::new(llm, store.clone(), ProfileConfig::default());

        manager.rebuild("u1", "g1", &[delta("u1", "mood", "friendly")]).await.unwrap();
        let second = manager.rebuild("u1", "g1", &[delta("u1", "mood", "excited")]).await.unwrap();

        assert_eq!(second.sequence, 1);
        assert_eq!(second.version, "0+1");
        let latest = store.get_latest("u1", "g1").await.unwrap().unwrap();
        assert_eq!(latest.version, "0+1");
    }
}
