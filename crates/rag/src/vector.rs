//! C5 — Qdrant-backed `VectorIndex` over `IndexRecord`/`Embedding`
//! (§4.8/§4.9). Connection, collection-ensure and filter-builder shape
//! are grounded on the reference workspace's `VectorStore`
//! (`crates/rag/src/vector_store.rs`), generalized from the teacher's
//! `Document`/category+language `SearchFilter` to `IndexRecord`'s
//! `ScopeFilter` (user_id/group_id/participant_user_id) and from a
//! fixed 384-dim collection to a configurable dimension carried by the
//! caller's `Embedding`.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, FieldCondition, Filter,
    Match, PointId, PointStruct, PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;

use memoria_core::error::Result as CoreResult;
use memoria_core::traits::index::VectorIndex;
use memoria_core::types::{Embedding, IndexRecord, ScopeFilter, ScoredHit, SearchSource};

use crate::error::RagError;

const PAYLOAD_KEY: &str = "payload_json";
const USER_ID_KEY: &str = "user_id";
const GROUP_ID_KEY: &str = "group_id";
const PARTICIPANTS_KEY: &str = "participants";

#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub endpoint: String,
    pub collection: String,
    pub vector_dim: usize,
    pub api_key: Option<String>,
}

pub struct QdrantVectorIndex {
    client: Qdrant,
    config: VectorIndexConfig,
}

impl QdrantVectorIndex {
    pub async fn new(config: VectorIndexConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self.client.collection_exists(&self.config.collection).await?;
        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine),
                    ),
                )
                .await?;
        }
        Ok(())
    }

    fn scope_filter_to_qdrant(filter: &ScopeFilter) -> Option<Filter> {
        let mut must = Vec::new();
        if let Some(ref user_id) = filter.user_id {
            must.push(keyword_condition(USER_ID_KEY, user_id));
        }
        if let Some(ref group_id) = filter.group_id {
            must.push(keyword_condition(GROUP_ID_KEY, group_id));
        }
        if let Some(ref participant) = filter.participant_user_id {
            must.push(keyword_condition(PARTICIPANTS_KEY, participant));
        }
        if must.is_empty() {
            None
        } else {
            Some(Filter {
                must,
                ..Default::default()
            })
        }
    }
}

fn keyword_condition(key: &str, value: &str) -> Condition {
    Condition {
        condition_one_of: Some(qdrant_client::qdrant::condition::ConditionOneOf::Field(
            FieldCondition {
                key: key.to_string(),
                r#match: Some(Match {
                    match_value: Some(qdrant_client::qdrant::r#match::MatchValue::Keyword(
                        value.to_string(),
                    )),
                }),
                ..Default::default()
            },
        )),
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(records.len());
        for record in records {
            let Some(ref embedding) = record.embedding else {
                tracing::warn!(id = %record.id, "skipping vector upsert for record with no embedding");
                continue;
            };

            let payload_json = serde_json::to_string(record)
                .map_err(|e| RagError::VectorIndex(format!("serialize record: {e}")))?;

            let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
            payload.insert(PAYLOAD_KEY.to_string(), payload_json.into());
            if let Some(ref user_id) = record.user_id {
                payload.insert(USER_ID_KEY.to_string(), user_id.clone().into());
            }
            if let Some(ref group_id) = record.group_id {
                payload.insert(GROUP_ID_KEY.to_string(), group_id.clone().into());
            }
            if !record.participants.is_empty() {
                let participants: Vec<qdrant_client::qdrant::Value> = record
                    .participants
                    .iter()
                    .map(|p| p.clone().into())
                    .collect();
                payload.insert(PARTICIPANTS_KEY.to_string(), participants.into());
            }

            points.push(PointStruct::new(
                record.id.clone(),
                embedding.values.clone(),
                payload,
            ));
        }

        if points.is_empty() {
            return Ok(());
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points))
            .await
            .map_err(RagError::from)?;
        Ok(())
    }

    async fn search(
        &self,
        query: &Embedding,
        filter: &ScopeFilter,
        top_k: usize,
        radius: Option<f32>,
    ) -> CoreResult<Vec<ScoredHit>> {
        let mut builder =
            SearchPointsBuilder::new(&self.config.collection, query.values.clone(), top_k as u64)
                .with_payload(true);

        if let Some(qdrant_filter) = Self::scope_filter_to_qdrant(filter) {
            builder = builder.filter(qdrant_filter);
        }
        if let Some(radius) = radius {
            builder = builder.score_threshold(radius);
        }

        let results = self.client.search_points(builder).await.map_err(RagError::from)?;

        let mut hits = Vec::with_capacity(results.result.len());
        for (rank, point) in results.result.into_iter().enumerate() {
            let Some(payload_value) = point.payload.get(PAYLOAD_KEY) else {
                tracing::warn!("qdrant point missing payload_json, skipping");
                continue;
            };
            let Some(qdrant_client::qdrant::value::Kind::StringValue(payload_json)) =
                payload_value.kind.as_ref()
            else {
                continue;
            };
            let record: IndexRecord = serde_json::from_str(payload_json)
                .map_err(|e| RagError::VectorIndex(format!("deserialize record: {e}")))?;

            hits.push(ScoredHit {
                record,
                score: point.score,
                source: SearchSource::Embedding,
                rank,
            });
        }

        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> CoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let points: Vec<PointId> = ids.iter().map(|id| PointId::from(id.clone())).collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.config.collection)
                    .points(PointsIdsList { ids: points }),
            )
            .await
            .map_err(RagError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_filter_with_only_group_id_builds_single_condition() {
        let filter = ScopeFilter {
            group_id: Some("g1".to_string()),
            ..Default::default()
        };
        let built = QdrantVectorIndex::scope_filter_to_qdrant(&filter).unwrap();
        assert_eq!(built.must.len(), 1);
    }

    #[test]
    fn empty_scope_filter_builds_no_qdrant_filter() {
        assert!(QdrantVectorIndex::scope_filter_to_qdrant(&ScopeFilter::default()).is_none());
    }
}
