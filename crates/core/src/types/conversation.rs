//! `ConversationStatus` (per-group processing watermarks) and
//! `ConversationMeta` (per-group descriptive record) — §3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStatus {
    pub group_id: String,
    pub old_msg_start_time: Option<DateTime<Utc>>,
    pub new_msg_start_time: Option<DateTime<Utc>>,
    pub last_memcell_time: Option<DateTime<Utc>>,
}

impl ConversationStatus {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            old_msg_start_time: None,
            new_msg_start_time: None,
            last_memcell_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationScene {
    Assistant,
    Companion,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDetail {
    pub full_name: Option<String>,
    pub role: Option<String>,
    /// Forward-compatible free-form map, never inspected by the core
    /// (§9 design note on heterogeneous "extra" maps).
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub group_id: String,
    pub scene: ConversationScene,
    pub user_details: HashMap<String, UserDetail>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub default_timezone: String,
}
