//! `SemanticMemoryStore` over ScyllaDB. `list_holding_at` (§8 P6) scans
//! the caller's scope partition (keyed by `user_id` when present,
//! otherwise `group_id`) and filters by `SemanticMemory::holds_at`
//! client-side — Scylla has no native interval-overlap predicate, so
//! the open-ended `end_time IS NULL` case is resolved in Rust rather
//! than modeled as a second index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use memoria_core::error::Result;
use memoria_core::traits::store::SemanticMemoryStore;
use memoria_core::types::SemanticMemory;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[derive(Clone)]
pub struct ScyllaSemanticMemoryStore {
    client: ScyllaClient,
}

impl ScyllaSemanticMemoryStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

fn scope_key(user_id: Option<&str>, group_id: Option<&str>) -> String {
    user_id.or(group_id).unwrap_or_default().to_string()
}

#[async_trait]
impl SemanticMemoryStore for ScyllaSemanticMemoryStore {
    async fn insert(&self, memory: &SemanticMemory) -> Result<()> {
        let ks = self.client.keyspace();
        let payload = serde_json::to_string(memory).map_err(PersistenceError::from)?;
        let scope = scope_key(memory.user_id.as_deref(), memory.group_id.as_deref());

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.semantic_memories_by_id (memory_id, parent_event_id, scope_key, payload_json) VALUES (?, ?, ?, ?)"
                ),
                (&memory.memory_id, &memory.parent_event_id, &scope, &payload),
            )
            .await
            .map_err(PersistenceError::from)?;

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.semantic_memories_by_parent (parent_event_id, memory_id, payload_json) VALUES (?, ?, ?)"
                ),
                (&memory.parent_event_id, &memory.memory_id, &payload),
            )
            .await
            .map_err(PersistenceError::from)?;

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.semantic_memories_by_scope (scope_key, start_time, memory_id, payload_json) VALUES (?, ?, ?, ?)"
                ),
                (&scope, memory.start_time.timestamp_millis(), &memory.memory_id, &payload),
            )
            .await
            .map_err(PersistenceError::from)?;

        tracing::info!(memory_id = %memory.memory_id, "semantic memory persisted");
        Ok(())
    }

    async fn delete(&self, memory_id: &str) -> Result<()> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!(
                    "SELECT payload_json FROM {ks}.semantic_memories_by_id WHERE memory_id = ?"
                ),
                (memory_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        let Some(rows) = result.rows else { return Ok(()) };
        let Some(row) = rows.into_iter().next() else { return Ok(()) };
        let (payload,): (String,) = row.into_typed().map_err(PersistenceError::from)?;
        let memory: SemanticMemory = serde_json::from_str(&payload).map_err(PersistenceError::from)?;
        let scope = scope_key(memory.user_id.as_deref(), memory.group_id.as_deref());

        self.client
            .session()
            .query_unpaged(
                format!("DELETE FROM {ks}.semantic_memories_by_id WHERE memory_id = ?"),
                (memory_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        self.client
            .session()
            .query_unpaged(
                format!(
                    "DELETE FROM {ks}.semantic_memories_by_parent WHERE parent_event_id = ? AND memory_id = ?"
                ),
                (&memory.parent_event_id, memory_id),
            )
            .await
            .map_err(PersistenceError::from)?;

        self.client
            .session()
            .query_unpaged(
                format!(
                    "DELETE FROM {ks}.semantic_memories_by_scope WHERE scope_key = ? AND start_time = ? AND memory_id = ?"
                ),
                (&scope, memory.start_time.timestamp_millis(), memory_id),
            )
            .await
            .map_err(PersistenceError::from)?;

        Ok(())
    }

    async fn list_for_parent(&self, parent_event_id: &str) -> Result<Vec<SemanticMemory>> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!(
                    "SELECT payload_json FROM {ks}.semantic_memories_by_parent WHERE parent_event_id = ?"
                ),
                (parent_event_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        let mut memories = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (payload,): (String,) = row.into_typed().map_err(PersistenceError::from)?;
                memories.push(serde_json::from_str(&payload).map_err(PersistenceError::from)?);
            }
        }
        Ok(memories)
    }

    async fn list_holding_at(
        &self,
        user_id: Option<&str>,
        group_id: Option<&str>,
        t: DateTime<Utc>,
    ) -> Result<Vec<SemanticMemory>> {
        let ks = self.client.keyspace();
        let scope = scope_key(user_id, group_id);

        let result = self
            .client
            .session()
            .query_unpaged(
                format!(
                    "SELECT payload_json FROM {ks}.semantic_memories_by_scope WHERE scope_key = ?"
                ),
                (&scope,),
            )
            .await
            .map_err(PersistenceError::from)?;

        let mut memories = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (payload,): (String,) = row.into_typed().map_err(PersistenceError::from)?;
                let memory: SemanticMemory =
                    serde_json::from_str(&payload).map_err(PersistenceError::from)?;
                if memory.holds_at(t) {
                    memories.push(memory);
                }
            }
        }
        Ok(memories)
    }
}
