//! `MemCell` (Episode) — the unit of promoted memory (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::embedding::Embedding;
use super::message::PendingMessage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemCell {
    pub event_id: String,
    pub group_id: Option<String>,
    pub user_id: Option<String>,
    pub participants: BTreeSet<String>,
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub summary: String,
    pub episode: String,
    pub original_data: Vec<PendingMessage>,
    pub embedding: Embedding,
    pub r#type: String,
    pub keywords: Vec<String>,
    pub linked_entities: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemCell {
    /// §3 invariant: participants must be a subset of the senders of
    /// `original_data`.
    pub fn participants_valid(&self) -> bool {
        let senders: BTreeSet<&str> = self
            .original_data
            .iter()
            .map(|m| m.sender_id.as_str())
            .collect();
        self.participants.iter().all(|p| senders.contains(p.as_str()))
    }
}
