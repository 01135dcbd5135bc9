//! `ConversationMetaStore` and `ConversationStatusStore` over ScyllaDB —
//! one row per group for each, the simplest possible shape in this
//! workspace (no secondary index needed, §3).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use memoria_core::error::Result;
use memoria_core::traits::store::{ConversationMetaStore, ConversationStatusStore};
use memoria_core::types::{ConversationMeta, ConversationScene, ConversationStatus};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[derive(Clone)]
pub struct ScyllaConversationMetaStore {
    client: ScyllaClient,
}

impl ScyllaConversationMetaStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConversationMetaStore for ScyllaConversationMetaStore {
    async fn upsert(&self, meta: &ConversationMeta) -> Result<()> {
        let ks = self.client.keyspace();
        let payload = serde_json::to_string(meta).map_err(PersistenceError::from)?;
        let scene = match meta.scene {
            ConversationScene::Assistant => "assistant",
            ConversationScene::Companion => "companion",
        };

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.conversation_meta (group_id, scene, default_timezone, created_at, payload_json) VALUES (?, ?, ?, ?, ?)"
                ),
                (
                    &meta.group_id,
                    scene,
                    &meta.default_timezone,
                    meta.created_at.timestamp_millis(),
                    &payload,
                ),
            )
            .await
            .map_err(PersistenceError::from)?;

        Ok(())
    }

    async fn get(&self, group_id: &str) -> Result<Option<ConversationMeta>> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!("SELECT payload_json FROM {ks}.conversation_meta WHERE group_id = ?"),
                (group_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        let Some(rows) = result.rows else { return Ok(None) };
        let Some(row) = rows.into_iter().next() else { return Ok(None) };
        let (payload,): (String,) = row.into_typed().map_err(PersistenceError::from)?;
        Ok(Some(
            serde_json::from_str(&payload).map_err(PersistenceError::from)?,
        ))
    }
}

#[derive(Clone)]
pub struct ScyllaConversationStatusStore {
    client: ScyllaClient,
}

impl ScyllaConversationStatusStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConversationStatusStore for ScyllaConversationStatusStore {
    async fn get(&self, group_id: &str) -> Result<Option<ConversationStatus>> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!(
                    "SELECT old_msg_start_time, new_msg_start_time, last_memcell_time FROM {ks}.conversation_status WHERE group_id = ?"
                ),
                (group_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        let Some(rows) = result.rows else { return Ok(None) };
        let Some(row) = rows.into_iter().next() else { return Ok(None) };
        let (old_start, new_start, last_memcell): (Option<i64>, Option<i64>, Option<i64>) =
            row.into_typed().map_err(PersistenceError::from)?;

        Ok(Some(ConversationStatus {
            group_id: group_id.to_string(),
            old_msg_start_time: old_start.and_then(DateTime::<Utc>::from_timestamp_millis),
            new_msg_start_time: new_start.and_then(DateTime::<Utc>::from_timestamp_millis),
            last_memcell_time: last_memcell.and_then(DateTime::<Utc>::from_timestamp_millis),
        }))
    }

    async fn upsert(&self, status: &ConversationStatus) -> Result<()> {
        let ks = self.client.keyspace();

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.conversation_status (group_id, old_msg_start_time, new_msg_start_time, last_memcell_time) VALUES (?, ?, ?, ?)"
                ),
                (
                    &status.group_id,
                    status.old_msg_start_time.map(|t| t.timestamp_millis()),
                    status.new_msg_start_time.map(|t| t.timestamp_millis()),
                    status.last_memcell_time.map(|t| t.timestamp_millis()),
                ),
            )
            .await
            .map_err(PersistenceError::from)?;

        Ok(())
    }
}
