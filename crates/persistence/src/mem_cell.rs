//! `MemCellStore` over ScyllaDB — main row by `event_id` plus two
//! denormalized index tables for the group- and user-scoped scans
//! (§4.2 retrieval surface), following the same by-partition indexing
//! pattern as `request_log.rs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use memoria_core::error::{Error, Result};
use memoria_core::traits::store::MemCellStore;
use memoria_core::types::MemCell;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[derive(Clone)]
pub struct ScyllaMemCellStore {
    client: ScyllaClient,
}

impl ScyllaMemCellStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MemCellStore for ScyllaMemCellStore {
    async fn insert(&self, cell: &MemCell) -> Result<()> {
        let ks = self.client.keyspace();
        let payload = serde_json::to_string(cell).map_err(PersistenceError::from)?;
        let ts = cell.timestamp.timestamp_millis();

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.mem_cells (event_id, group_id, user_id, timestamp, payload_json) VALUES (?, ?, ?, ?, ?)"
                ),
                (&cell.event_id, &cell.group_id, &cell.user_id, ts, &payload),
            )
            .await
            .map_err(PersistenceError::from)?;

        if let Some(group_id) = &cell.group_id {
            self.client
                .session()
                .query_unpaged(
                    format!(
                        "INSERT INTO {ks}.mem_cells_by_group (group_id, timestamp, event_id, payload_json) VALUES (?, ?, ?, ?)"
                    ),
                    (group_id, ts, &cell.event_id, &payload),
                )
                .await
                .map_err(PersistenceError::from)?;
        }

        if let Some(user_id) = &cell.user_id {
            self.client
                .session()
                .query_unpaged(
                    format!(
                        "INSERT INTO {ks}.mem_cells_by_user (user_id, group_id, timestamp, event_id, payload_json) VALUES (?, ?, ?, ?, ?)"
                    ),
                    (
                        user_id,
                        cell.group_id.clone().unwrap_or_default(),
                        ts,
                        &cell.event_id,
                        &payload,
                    ),
                )
                .await
                .map_err(PersistenceError::from)?;
        }

        tracing::info!(event_id = %cell.event_id, "mem cell persisted");
        Ok(())
    }

    async fn get(&self, event_id: &str) -> Result<Option<MemCell>> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!("SELECT payload_json FROM {ks}.mem_cells WHERE event_id = ?"),
                (event_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        decode_single(result)
    }

    async fn delete(&self, event_id: &str) -> Result<()> {
        let Some(cell) = self.get(event_id).await? else {
            return Ok(());
        };
        let ks = self.client.keyspace();
        let ts = cell.timestamp.timestamp_millis();

        self.client
            .session()
            .query_unpaged(
                format!("DELETE FROM {ks}.mem_cells WHERE event_id = ?"),
                (event_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        if let Some(group_id) = &cell.group_id {
            self.client
                .session()
                .query_unpaged(
                    format!(
                        "DELETE FROM {ks}.mem_cells_by_group WHERE group_id = ? AND timestamp = ? AND event_id = ?"
                    ),
                    (group_id, ts, event_id),
                )
                .await
                .map_err(PersistenceError::from)?;
        }

        if let Some(user_id) = &cell.user_id {
            self.client
                .session()
                .query_unpaged(
                    format!(
                        "DELETE FROM {ks}.mem_cells_by_user WHERE user_id = ? AND group_id = ? AND timestamp = ? AND event_id = ?"
                    ),
                    (user_id, cell.group_id.clone().unwrap_or_default(), ts, event_id),
                )
                .await
                .map_err(PersistenceError::from)?;
        }

        Ok(())
    }

    async fn list_for_group(
        &self,
        group_id: &str,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        limit: usize,
    ) -> Result<Vec<MemCell>> {
        let ks = self.client.keyspace();
        let result = match range {
            Some((start, end)) => self
                .client
                .session()
                .query_unpaged(
                    format!(
                        "SELECT payload_json FROM {ks}.mem_cells_by_group WHERE group_id = ? AND timestamp >= ? AND timestamp <= ? LIMIT ?"
                    ),
                    (
                        group_id,
                        start.timestamp_millis(),
                        end.timestamp_millis(),
                        limit as i32,
                    ),
                )
                .await
                .map_err(PersistenceError::from)?,
            None => self
                .client
                .session()
                .query_unpaged(
                    format!(
                        "SELECT payload_json FROM {ks}.mem_cells_by_group WHERE group_id = ? LIMIT ?"
                    ),
                    (group_id, limit as i32),
                )
                .await
                .map_err(PersistenceError::from)?,
        };

        decode_many(result)
    }

    async fn list_for_user(&self, user_id: &str, group_id: &str, limit: usize) -> Result<Vec<MemCell>> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!(
                    "SELECT payload_json FROM {ks}.mem_cells_by_user WHERE user_id = ? AND group_id = ? LIMIT ?"
                ),
                (user_id, group_id, limit as i32),
            )
            .await
            .map_err(PersistenceError::from)?;

        decode_many(result)
    }
}

fn decode_single(result: scylla::QueryResult) -> Result<Option<MemCell>> {
    let Some(rows) = result.rows else {
        return Ok(None);
    };
    let Some(row) = rows.into_iter().next() else {
        return Ok(None);
    };
    let (payload,): (String,) = row.into_typed().map_err(PersistenceError::from)?;
    let cell: MemCell = serde_json::from_str(&payload).map_err(PersistenceError::from)?;
    Ok(Some(cell))
}

fn decode_many(result: scylla::QueryResult) -> Result<Vec<MemCell>> {
    let mut cells = Vec::new();
    if let Some(rows) = result.rows {
        for row in rows {
            let (payload,): (String,) = row.into_typed().map_err(PersistenceError::from)?;
            cells.push(serde_json::from_str(&payload).map_err(PersistenceError::from)?);
        }
    }
    Ok(cells)
}
