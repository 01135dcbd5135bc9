//! `ProfileStore` over ScyllaDB (§4.6). Partitions are one per
//! `(user_id, group_id)` and hold every version ever written, clustered
//! by `sequence DESC` — small enough to scan in full for the
//! read-modify-write reconciliation `ensure_latest` needs.

use async_trait::async_trait;

use memoria_core::error::Result;
use memoria_core::traits::store::ProfileStore;
use memoria_core::types::Profile;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[derive(Clone)]
pub struct ScyllaProfileStore {
    client: ScyllaClient,
}

impl ScyllaProfileStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn partition_rows(&self, user_id: &str, group_id: &str) -> Result<Vec<Profile>> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!(
                    "SELECT payload_json FROM {ks}.profiles WHERE user_id = ? AND group_id = ?"
                ),
                (user_id, group_id),
            )
            .await
            .map_err(PersistenceError::from)?;

        let mut rows = Vec::new();
        if let Some(result_rows) = result.rows {
            for row in result_rows {
                let (payload,): (String,) = row.into_typed().map_err(PersistenceError::from)?;
                rows.push(serde_json::from_str::<Profile>(&payload).map_err(PersistenceError::from)?);
            }
        }
        Ok(rows)
    }

    async fn set_is_latest(&self, profile: &Profile, is_latest: bool) -> Result<()> {
        let ks = self.client.keyspace();
        self.client
            .session()
            .query_unpaged(
                format!(
                    "UPDATE {ks}.profiles SET is_latest = ? WHERE user_id = ? AND group_id = ? AND sequence = ?"
                ),
                (is_latest, &profile.user_id, &profile.group_id, profile.sequence as i64),
            )
            .await
            .map_err(PersistenceError::from)?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for ScyllaProfileStore {
    async fn insert(&self, profile: &Profile) -> Result<()> {
        let ks = self.client.keyspace();
        let payload = serde_json::to_string(profile).map_err(PersistenceError::from)?;

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.profiles (user_id, group_id, sequence, version, is_latest, payload_json, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)"
                ),
                (
                    &profile.user_id,
                    &profile.group_id,
                    profile.sequence as i64,
                    &profile.version,
                    profile.is_latest,
                    &payload,
                    profile.created_at.timestamp_millis(),
                ),
            )
            .await
            .map_err(PersistenceError::from)?;

        tracing::info!(
            user_id = %profile.user_id,
            group_id = %profile.group_id,
            sequence = profile.sequence,
            "profile version persisted"
        );
        Ok(())
    }

    async fn get_latest(&self, user_id: &str, group_id: &str) -> Result<Option<Profile>> {
        let mut rows = self.partition_rows(user_id, group_id).await?;
        if let Some(pos) = rows.iter().position(|p| p.is_latest) {
            return Ok(Some(rows.swap_remove(pos)));
        }
        rows.sort_by_key(|p| std::cmp::Reverse(p.sequence));
        Ok(rows.into_iter().next())
    }

    async fn set_latest(&self, user_id: &str, group_id: &str, version: &str) -> Result<()> {
        let rows = self.partition_rows(user_id, group_id).await?;
        for row in &rows {
            if row.version == version && !row.is_latest {
                self.set_is_latest(row, true).await?;
            } else if row.version != version && row.is_latest {
                self.set_is_latest(row, false).await?;
            }
        }
        Ok(())
    }

    async fn ensure_latest(&self, user_id: &str, group_id: &str) -> Result<()> {
        let rows = self.partition_rows(user_id, group_id).await?;
        let Some(max) = rows.iter().max_by_key(|p| p.sequence) else {
            return Ok(());
        };
        for row in &rows {
            let should_be_latest = row.sequence == max.sequence;
            if row.is_latest != should_be_latest {
                self.set_is_latest(row, should_be_latest).await?;
            }
        }
        Ok(())
    }
}
