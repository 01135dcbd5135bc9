//! `AtomicEventStore` over ScyllaDB. `delete` only receives `log_id`,
//! not the parent, so the by-id table doubles as a lookup to find which
//! partition of `atomic_events_by_parent` to remove the row from.

use async_trait::async_trait;

use memoria_core::error::Result;
use memoria_core::traits::store::AtomicEventStore;
use memoria_core::types::AtomicEvent;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[derive(Clone)]
pub struct ScyllaAtomicEventStore {
    client: ScyllaClient,
}

impl ScyllaAtomicEventStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AtomicEventStore for ScyllaAtomicEventStore {
    async fn insert(&self, event: &AtomicEvent) -> Result<()> {
        let ks = self.client.keyspace();
        let payload = serde_json::to_string(event).map_err(PersistenceError::from)?;

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.atomic_events_by_id (log_id, parent_event_id, payload_json) VALUES (?, ?, ?)"
                ),
                (&event.log_id, &event.parent_event_id, &payload),
            )
            .await
            .map_err(PersistenceError::from)?;

        self.client
            .session()
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.atomic_events_by_parent (parent_event_id, log_id, payload_json) VALUES (?, ?, ?)"
                ),
                (&event.parent_event_id, &event.log_id, &payload),
            )
            .await
            .map_err(PersistenceError::from)?;

        tracing::info!(log_id = %event.log_id, parent_event_id = %event.parent_event_id, "atomic event persisted");
        Ok(())
    }

    async fn delete(&self, log_id: &str) -> Result<()> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!("SELECT parent_event_id FROM {ks}.atomic_events_by_id WHERE log_id = ?"),
                (log_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        let parent_event_id = match result.rows {
            Some(rows) if !rows.is_empty() => {
                let (parent,): (String,) = rows.into_iter().next().unwrap().into_typed().map_err(PersistenceError::from)?;
                parent
            }
            _ => return Ok(()),
        };

        self.client
            .session()
            .query_unpaged(
                format!("DELETE FROM {ks}.atomic_events_by_id WHERE log_id = ?"),
                (log_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        self.client
            .session()
            .query_unpaged(
                format!(
                    "DELETE FROM {ks}.atomic_events_by_parent WHERE parent_event_id = ? AND log_id = ?"
                ),
                (&parent_event_id, log_id),
            )
            .await
            .map_err(PersistenceError::from)?;

        Ok(())
    }

    async fn list_for_parent(&self, parent_event_id: &str) -> Result<Vec<AtomicEvent>> {
        let ks = self.client.keyspace();
        let result = self
            .client
            .session()
            .query_unpaged(
                format!(
                    "SELECT payload_json FROM {ks}.atomic_events_by_parent WHERE parent_event_id = ?"
                ),
                (parent_event_id,),
            )
            .await
            .map_err(PersistenceError::from)?;

        let mut events = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (payload,): (String,) = row.into_typed().map_err(PersistenceError::from)?;
                events.push(serde_json::from_str(&payload).map_err(PersistenceError::from)?);
            }
        }
        Ok(events)
    }
}
