//! Shared query-shaping types used by both the document store's
//! time-range scans (C3) and the retrieval engine's scope filters
//! (C14, §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Episode,
    EventLog,
    SemanticMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Bm25,
    Embedding,
    Rrf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    All,
    Personal,
    Group,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Resolved scope filters (§4.9 step 1: "rewrite scope to filters").
/// `Scope::Personal` is strictly `user_id = caller AND group_id IS
/// NULL` (open question #3, resolved in SPEC_FULL.md §9);
/// `participant_user_id` is an orthogonal filter layered on top of
/// `Scope::Group` when the caller wants group episodes a specific
/// user took part in.
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub participant_user_id: Option<String>,
}

impl ScopeFilter {
    pub fn resolve(scope: Scope, caller_user_id: &str, caller_group_id: Option<&str>) -> Self {
        match scope {
            Scope::All => ScopeFilter::default(),
            Scope::Personal => ScopeFilter {
                user_id: Some(caller_user_id.to_string()),
                group_id: None,
                participant_user_id: None,
            },
            Scope::Group => ScopeFilter {
                user_id: None,
                group_id: caller_group_id.map(|g| g.to_string()),
                participant_user_id: None,
            },
        }
    }

    pub fn with_participant(mut self, participant_user_id: impl Into<String>) -> Self {
        self.participant_user_id = Some(participant_user_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_scope_ignores_group_id() {
        let f = ScopeFilter::resolve(Scope::Personal, "u1", Some("g1"));
        assert_eq!(f.user_id, Some("u1".to_string()));
        assert_eq!(f.group_id, None);
    }

    #[test]
    fn group_scope_with_participant_filter() {
        let f = ScopeFilter::resolve(Scope::Group, "u1", Some("g1")).with_participant("u2");
        assert_eq!(f.group_id, Some("g1".to_string()));
        assert_eq!(f.participant_user_id, Some("u2".to_string()));
    }
}
