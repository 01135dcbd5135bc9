//! `SemanticMemory` — a time-bounded proposition derived from a
//! `MemCell` (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::embedding::Embedding;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticMemory {
    pub memory_id: String,
    pub parent_event_id: String,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub content: String,
    pub evidence: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_days: Option<i64>,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
}

/// Sanity ceiling for `duration_days` (§4.4): values above this are
/// clipped and logged rather than rejected outright.
pub const MAX_DURATION_DAYS: i64 = 365 * 50;

impl SemanticMemory {
    /// §3 invariant: `start_time <= end_time` when `end_time` is set.
    pub fn interval_valid(&self) -> bool {
        match self.end_time {
            Some(end) => self.start_time <= end,
            None => true,
        }
    }

    /// `start_time <= t <= (end_time or +inf)` (§8 P6).
    pub fn holds_at(&self, t: DateTime<Utc>) -> bool {
        self.start_time <= t && self.end_time.map(|end| t <= end).unwrap_or(true)
    }

    /// Clamp negative durations to zero and clip above the sanity
    /// ceiling, per §4.4.
    pub fn clamp_duration(days: i64) -> i64 {
        days.max(0).min(MAX_DURATION_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn holds_at_open_ended() {
        let mem = SemanticMemory {
            memory_id: "m1".into(),
            parent_event_id: "e1".into(),
            user_id: None,
            group_id: None,
            content: "lives in Berlin".into(),
            evidence: "I moved to Berlin".into(),
            start_time: ts(2024, 6, 1),
            end_time: None,
            duration_days: None,
            embedding: Embedding::new("m", vec![0.1]),
            created_at: ts(2024, 6, 1),
        };
        assert!(mem.holds_at(ts(2025, 1, 1)));
        assert!(!mem.holds_at(ts(2024, 1, 1)));
    }

    #[test]
    fn clamp_duration_bounds() {
        assert_eq!(SemanticMemory::clamp_duration(-5), 0);
        assert_eq!(SemanticMemory::clamp_duration(1_000_000), MAX_DURATION_DAYS);
    }
}
