//! C3 / C7 — CRUD + time-range scans over typed records (§4.10, §4.2).
//!
//! One trait per entity rather than a single generic `Store<T>` —
//! each entity has a distinct access pattern (`find_pending` scans by
//! status for the request log, `ensure_latest` is profile-specific,
//! cluster state is a single read-modify-write blob per group) that a
//! blanket generic trait would have to paper over with an `Any`-typed
//! query object. `memoria-persistence` implements all of these against
//! ScyllaDB; `memoria-core::test_support` provides in-memory fakes for
//! the rest of the workspace's tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    AtomicEvent, ClusterState, ConversationMeta, ConversationStatus, MemCell, PendingMessage,
    Profile, SemanticMemory, SyncStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// C7 — durable append-log of every ingested message.
#[async_trait]
pub trait RequestLogStore: Send + Sync {
    /// Idempotent on `message_id` (§7 Conflict: duplicate insert is a
    /// no-op that returns the existing row).
    async fn insert(&self, message: &PendingMessage) -> Result<()>;

    async fn get(&self, message_id: &str) -> Result<Option<PendingMessage>>;

    async fn find_pending(
        &self,
        user_id: Option<&str>,
        group_id: Option<&str>,
        statuses: &[SyncStatus],
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<PendingMessage>>;

    async fn mark_status(&self, message_ids: &[String], new_status: SyncStatus) -> Result<()>;
}

#[async_trait]
pub trait MemCellStore: Send + Sync {
    async fn insert(&self, cell: &MemCell) -> Result<()>;
    async fn get(&self, event_id: &str) -> Result<Option<MemCell>>;
    async fn delete(&self, event_id: &str) -> Result<()>;

    async fn list_for_group(
        &self,
        group_id: &str,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        limit: usize,
    ) -> Result<Vec<MemCell>>;

    async fn list_for_user(
        &self,
        user_id: &str,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<MemCell>>;
}

#[async_trait]
pub trait AtomicEventStore: Send + Sync {
    async fn insert(&self, event: &AtomicEvent) -> Result<()>;
    async fn delete(&self, log_id: &str) -> Result<()>;
    async fn list_for_parent(&self, parent_event_id: &str) -> Result<Vec<AtomicEvent>>;
}

#[async_trait]
pub trait SemanticMemoryStore: Send + Sync {
    async fn insert(&self, memory: &SemanticMemory) -> Result<()>;
    async fn delete(&self, memory_id: &str) -> Result<()>;
    async fn list_for_parent(&self, parent_event_id: &str) -> Result<Vec<SemanticMemory>>;

    /// §8 P6: records where `start_time <= t <= (end_time or +inf)`.
    async fn list_holding_at(
        &self,
        user_id: Option<&str>,
        group_id: Option<&str>,
        t: DateTime<Utc>,
    ) -> Result<Vec<SemanticMemory>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn insert(&self, profile: &Profile) -> Result<()>;

    async fn get_latest(&self, user_id: &str, group_id: &str) -> Result<Option<Profile>>;

    async fn set_latest(&self, user_id: &str, group_id: &str, version: &str) -> Result<()>;

    /// §4.6 step 5: find the row with the maximum `sequence` and make
    /// exactly that one `is_latest = true`. Idempotent; repairs
    /// concurrent-writer anomalies (§8 P2).
    async fn ensure_latest(&self, user_id: &str, group_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ClusterStateStore: Send + Sync {
    async fn load(&self, group_id: &str) -> Result<Option<ClusterState>>;
    async fn save(&self, state: &ClusterState) -> Result<()>;
}

#[async_trait]
pub trait ConversationMetaStore: Send + Sync {
    async fn upsert(&self, meta: &ConversationMeta) -> Result<()>;
    async fn get(&self, group_id: &str) -> Result<Option<ConversationMeta>>;
}

#[async_trait]
pub trait ConversationStatusStore: Send + Sync {
    async fn get(&self, group_id: &str) -> Result<Option<ConversationStatus>>;
    async fn upsert(&self, status: &ConversationStatus) -> Result<()>;
}
