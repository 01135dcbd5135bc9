//! `AtomicEvent` (EventLog) — a single factual clause derived from one
//! `MemCell` (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::embedding::Embedding;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicEvent {
    pub log_id: String,
    pub parent_event_id: String,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub participants: BTreeSet<String>,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub atomic_fact: String,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
}

impl AtomicEvent {
    /// §3 invariant: `timestamp` within `[parent.timestamp - delta,
    /// parent.timestamp + delta]`.
    pub fn timestamp_within_delta(
        &self,
        parent_timestamp: DateTime<Utc>,
        delta: chrono::Duration,
    ) -> bool {
        let diff = self.timestamp - parent_timestamp;
        diff >= -delta && diff <= delta
    }
}
