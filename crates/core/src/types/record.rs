//! The indexed-record shape pushed by the Sync Service (C13) and read
//! back by the Retrieval Engine (C14, §4.8/§4.9). A single logical
//! schema shared by MemCell/AtomicEvent/SemanticMemory, discriminated
//! by `data_source`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::query::DataSource;
use super::{Embedding, ScopeFilter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub data_source: DataSource,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub participants: BTreeSet<String>,
    pub primary_text: String,
    /// Tokenized, stopword-filtered form of `primary_text` (§4.8).
    pub search_content: Vec<String>,
    pub embedding: Option<Embedding>,
    pub timestamp: DateTime<Utc>,
}

impl IndexRecord {
    pub fn matches_scope(&self, filter: &ScopeFilter) -> bool {
        if let Some(ref uid) = filter.user_id {
            if self.user_id.as_deref() != Some(uid.as_str()) {
                return false;
            }
        }
        if let Some(ref gid) = filter.group_id {
            if self.group_id.as_deref() != Some(gid.as_str()) {
                return false;
            }
        }
        if let Some(ref pid) = filter.participant_user_id {
            if !self.participants.contains(pid) {
                return false;
            }
        }
        true
    }
}

/// Which backend(s) produced a retrieval hit, and at what rank/score —
/// the per-record provenance annotation required by §4.9 step 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Bm25,
    Embedding,
    Rrf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredHit {
    pub record: IndexRecord,
    pub score: f32,
    pub source: SearchSource,
    pub rank: usize,
}
