//! `PendingMessage` — a raw message awaiting segmentation (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Tri-state consumption marker the request log and conversation queue
/// key off of. `-1` = recorded only, `0` = in-window, `1` = consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i8)]
pub enum SyncStatus {
    Recorded = -1,
    InWindow = 0,
    Consumed = 1,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMessage {
    pub message_id: String,
    pub group_id: Option<String>,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub refer_list: Vec<String>,
    pub status: SyncStatus,
}

impl PendingMessage {
    pub fn new(
        message_id: impl Into<String>,
        sender_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            group_id: None,
            sender_id: sender_id.into(),
            sender_name: None,
            role,
            content: content.into(),
            created_at,
            refer_list: Vec::new(),
            status: SyncStatus::Recorded,
        }
    }

    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }
}
