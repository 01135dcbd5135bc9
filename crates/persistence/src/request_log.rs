//! C7 — `RequestLogStore` over ScyllaDB, grounded on the reference
//! workspace's `appointments.rs` trait+impl+tests template (manual
//! row-to-struct conversion via `into_typed`, `query_unpaged` calls).
//!
//! `status` is part of the clustering key on the two index tables, so
//! `mark_status` can't `UPDATE` it in place — it deletes the old
//! clustering row and inserts the new one, same as any Scylla model
//! where a filter column doubles as a clustering key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use memoria_core::error::{Error, Result};
use memoria_core::traits::store::{RequestLogStore, SortOrder};
use memoria_core::types::{MessageRole, PendingMessage, SyncStatus};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[derive(Clone)]
pub struct ScyllaRequestLogStore {
    client: ScyllaClient,
}

impl ScyllaRequestLogStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn insert_inner(&self, message: &PendingMessage) -> Result<(), PersistenceError> {
        let ks = self.client.keyspace();
        let payload = serde_json::to_string(message)?;
        let status = status_code(message.status);

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.request_log (message_id, group_id, sender_id, status, created_at, payload_json) VALUES (?, ?, ?, ?, ?, ?)"
                ),
                (
                    &message.message_id,
                    &message.group_id,
                    &message.sender_id,
                    status,
                    message.created_at.timestamp_millis(),
                    &payload,
                ),
            )
            .await?;

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.request_log_by_user (sender_id, status, created_at, message_id, payload_json) VALUES (?, ?, ?, ?, ?)"
                ),
                (
                    &message.sender_id,
                    status,
                    message.created_at.timestamp_millis(),
                    &message.message_id,
                    &payload,
                ),
            )
            .await?;

        if let Some(group_id) = &message.group_id {
            self.client
                .session()
                .query_unpaged(
                    format!(
                        "INSERT INTO {ks}.request_log_by_group (group_id, status, created_at, message_id, payload_json) VALUES (?, ?, ?, ?, ?)"
                    ),
                    (
                        group_id,
                        status,
                        message.created_at.timestamp_millis(),
                        &message.message_id,
                        &payload,
                    ),
                )
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl RequestLogStore for ScyllaRequestLogStore {
    async fn insert(&self, message: &PendingMessage) -> Result<()> {
        if self.get(&message.message_id).await?.is_some() {
            return Ok(());
        }
        self.insert_inner(message).await.map_err(Error::from)?;
        tracing::info!(message_id = %message.message_id, "request log entry recorded");
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<PendingMessage>> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!("SELECT payload_json FROM {ks}.request_log WHERE message_id = ?"),
                (message_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        let Some(rows) = result.rows else {
            return Ok(None);
        };
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let (payload,): (String,) = row.into_typed().map_err(PersistenceError::from)?;
        let message: PendingMessage =
            serde_json::from_str(&payload).map_err(PersistenceError::from)?;
        Ok(Some(message))
    }

    async fn find_pending(
        &self,
        user_id: Option<&str>,
        group_id: Option<&str>,
        statuses: &[SyncStatus],
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<PendingMessage>> {
        let ks = self.client.keyspace();
        let codes: Vec<i8> = statuses.iter().map(|s| status_code(*s)).collect();
        let placeholders = vec!["?"; codes.len()].join(", ");

        let result = if let Some(group_id) = group_id {
            let query = format!(
                "SELECT payload_json FROM {ks}.request_log_by_group WHERE group_id = ? AND status IN ({placeholders})"
            );
            let mut values: Vec<scylla::frame::value::CqlValue> =
                vec![scylla::frame::value::CqlValue::Text(group_id.to_string())];
            for code in &codes {
                values.push(scylla::frame::value::CqlValue::TinyInt(*code));
            }
            self.client
                .session()
                .query_unpaged(query, values)
                .await
                .map_err(PersistenceError::from)?
        } else if let Some(user_id) = user_id {
            let query = format!(
                "SELECT payload_json FROM {ks}.request_log_by_user WHERE sender_id = ? AND status IN ({placeholders})"
            );
            let mut values: Vec<scylla::frame::value::CqlValue> =
                vec![scylla::frame::value::CqlValue::Text(user_id.to_string())];
            for code in &codes {
                values.push(scylla::frame::value::CqlValue::TinyInt(*code));
            }
            self.client
                .session()
                .query_unpaged(query, values)
                .await
                .map_err(PersistenceError::from)?
        } else {
            return Ok(Vec::new());
        };

        let mut messages = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (payload,): (String,) = row.into_typed().map_err(PersistenceError::from)?;
                let message: PendingMessage =
                    serde_json::from_str(&payload).map_err(PersistenceError::from)?;
                messages.push(message);
            }
        }

        match order {
            SortOrder::Ascending => messages.sort_by_key(|m| m.created_at),
            SortOrder::Descending => messages.sort_by_key(|m| std::cmp::Reverse(m.created_at)),
        }
        messages.truncate(limit);
        Ok(messages)
    }

    async fn mark_status(&self, message_ids: &[String], new_status: SyncStatus) -> Result<()> {
        for message_id in message_ids {
            let Some(mut message) = self.get(message_id).await? else {
                continue;
            };
            let old_status = message.status;
            self.delete_index_rows(&message, old_status)
                .await
                .map_err(Error::from)?;
            message.status = new_status;
            self.insert_inner(&message).await.map_err(Error::from)?;
        }
        Ok(())
    }
}

impl ScyllaRequestLogStore {
    async fn delete_index_rows(
        &self,
        message: &PendingMessage,
        status: SyncStatus,
    ) -> Result<(), PersistenceError> {
        let ks = self.client.keyspace();
        let code = status_code(status);

        self.client
            .session()
            .query_unpaged(
                format!(
                    "DELETE FROM {ks}.request_log_by_user WHERE sender_id = ? AND status = ? AND created_at = ? AND message_id = ?"
                ),
                (
                    &message.sender_id,
                    code,
                    message.created_at.timestamp_millis(),
                    &message.message_id,
                ),
            )
            .await?;

        if let Some(group_id) = &message.group_id {
            self.client
                .session()
                .query_unpaged(
                    format!(
                        "DELETE FROM {ks}.request_log_by_group WHERE group_id = ? AND status = ? AND created_at = ? AND message_id = ?"
                    ),
                    (
                        group_id,
                        code,
                        message.created_at.timestamp_millis(),
                        &message.message_id,
                    ),
                )
                .await?;
        }

        Ok(())
    }
}

fn status_code(status: SyncStatus) -> i8 {
    status as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_repr() {
        assert_eq!(status_code(SyncStatus::Recorded), -1);
        assert_eq!(status_code(SyncStatus::InWindow), 0);
        assert_eq!(status_code(SyncStatus::Consumed), 1);
    }

    #[test]
    fn role_round_trips_through_json() {
        let msg = PendingMessage::new("m1", "u1", MessageRole::User, "hi", Utc::now());
        let payload = serde_json::to_string(&msg).unwrap();
        let back: PendingMessage = serde_json::from_str(&payload).unwrap();
        assert_eq!(back.message_id, "m1");
        assert_eq!(back.role, MessageRole::User);
    }
}
