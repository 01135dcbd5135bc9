//! `ClusterStateStore` over ScyllaDB — one row per group holding the
//! entire `ClusterState` blob (§4.5). The clustering algorithm itself
//! (`memoria-memory`) owns all read-modify-write logic; this store is a
//! plain load/save pair.

use async_trait::async_trait;

use memoria_core::error::Result;
use memoria_core::traits::store::ClusterStateStore;
use memoria_core::types::ClusterState;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[derive(Clone)]
pub struct ScyllaClusterStateStore {
    client: ScyllaClient,
}

impl ScyllaClusterStateStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterStateStore for ScyllaClusterStateStore {
    async fn load(&self, group_id: &str) -> Result<Option<ClusterState>> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!("SELECT payload_json FROM {ks}.cluster_state WHERE group_id = ?"),
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

    async fn save(&self, state: &ClusterState) -> Result<()> {
        let ks = self.client.keyspace();
        let payload = serde_json::to_string(state).map_err(PersistenceError::from)?;

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.cluster_state (group_id, payload_json) VALUES (?, ?)"
                ),
                (&state.group_id, &payload),
            )
            .await
            .map_err(PersistenceError::from)?;

        tracing::info!(group_id = %state.group_id, clusters = state.clusters.len(), "cluster state saved");
        Ok(())
    }
}
