//! `Profile` — a versioned per-user summary scoped to a group (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitEntry {
    pub value: String,
    pub evidences: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePayload(pub HashMap<String, Vec<TraitEntry>>);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub group_id: String,
    /// Human-readable version string, §4.6's `(old_version or "") +
    /// "+" + new_sequence`.
    pub version: String,
    /// Monotonically increasing counter backing `version`'s ordering —
    /// string concatenation alone is not totally ordered, so
    /// `ensure_latest` (§4.6) compares this field rather than parsing
    /// `version`.
    pub sequence: u64,
    pub is_latest: bool,
    pub payload: ProfilePayload,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// `version = (old_version or "") + "+" + new_sequence` (§4.6).
    pub fn next_version(old_version: Option<&str>, new_sequence: u64) -> String {
        match old_version {
            Some(v) if !v.is_empty() => format!("{v}+{new_sequence}"),
            _ => new_sequence.to_string(),
        }
    }
}
