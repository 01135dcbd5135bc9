//! C6 — Conversation Queue (§4.1). A per-`group_id` bounded FIFO of
//! recently ingested messages with a lazily-swept TTL.
//!
//! Grounded on the reference workspace's use of `dashmap` for
//! per-key-locking shared state (its session registries) rather than a
//! single `parking_lot::RwLock<HashMap<_>>` guarding every key — a
//! `DashMap` entry already gives each group its own shard, so distinct
//! groups never contend on append/range.

use std::time::Instant;

use dashmap::DashMap;
use rand::Rng;

use memoria_config::QueueConfig;
use memoria_core::types::PendingMessage;

struct QueueEntry {
    message: PendingMessage,
    seq: u64,
}

struct GroupQueue {
    entries: Vec<QueueEntry>,
    next_seq: u64,
    last_write: Instant,
}

impl GroupQueue {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
            last_write: Instant::now(),
        }
    }

    fn is_expired(&self, ttl_secs: u64) -> bool {
        self.last_write.elapsed().as_secs() > ttl_secs
    }
}

/// §4.1: holds at most `capacity` most-recent messages per `group_id`,
/// in arrival order (ties broken by an insertion counter).
pub struct ConversationQueue {
    groups: DashMap<String, GroupQueue>,
    config: QueueConfig,
}

impl ConversationQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            groups: DashMap::new(),
            config,
        }
    }

    /// Appends `message` to `key`'s queue, truncating the head if the
    /// configured capacity is exceeded.
    pub fn append(&self, key: &str, message: PendingMessage) {
        self.maybe_sweep();

        let mut group = self.groups.entry(key.to_string()).or_insert_with(GroupQueue::new);
        let seq = group.next_seq;
        group.next_seq += 1;
        group.entries.push(QueueEntry { message, seq });

        if group.entries.len() > self.config.capacity {
            let overflow = group.entries.len() - self.config.capacity;
            group.entries.drain(0..overflow);
        }
        group.last_write = Instant::now();
    }

    /// Entries for `key` with `t ∈ [t0, t1]`, ascending by timestamp
    /// (ties broken by insertion order), truncated to `limit`.
    pub fn range(
        &self,
        key: &str,
        t0: chrono::DateTime<chrono::Utc>,
        t1: chrono::DateTime<chrono::Utc>,
        limit: usize,
    ) -> Vec<PendingMessage> {
        self.maybe_sweep();

        let Some(group) = self.groups.get(key) else {
            return Vec::new();
        };

        let mut matched: Vec<&QueueEntry> = group
            .entries
            .iter()
            .filter(|e| e.message.created_at >= t0 && e.message.created_at <= t1)
            .collect();
        matched.sort_by_key(|e| (e.message.created_at, e.seq));
        matched.truncate(limit);
        matched.into_iter().map(|e| e.message.clone()).collect()
    }

    /// All entries currently held for `key`, in arrival order.
    pub fn all(&self, key: &str) -> Vec<PendingMessage> {
        self.maybe_sweep();
        self.groups
            .get(key)
            .map(|g| g.entries.iter().map(|e| e.message.clone()).collect())
            .unwrap_or_default()
    }

    pub fn delete(&self, key: &str) {
        self.groups.remove(key);
    }

    /// With probability `sweep_probability`, evict keys whose TTL has
    /// elapsed. Called on every access (§4.1's "lazily removed on
    /// access (probability p per call)").
    fn maybe_sweep(&self) {
        if rand::thread_rng().gen::<f32>() >= self.config.sweep_probability {
            return;
        }
        self.sweep_expired();
    }

    /// Proactive removal of every expired key; the composition root
    /// may also drive this from a background `tokio::spawn`ed
    /// interval task per §4.1's "sweeper" note.
    pub fn sweep_expired(&self) {
        let ttl = self.config.ttl_secs;
        self.groups.retain(|_, group| !group.is_expired(ttl));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use memoria_core::types::MessageRole;

    fn msg(id: &str, at: chrono::DateTime<Utc>) -> PendingMessage {
        PendingMessage::new(id, "u1", MessageRole::User, "hello", at)
    }

    #[test]
    fn append_truncates_over_capacity() {
        let queue = ConversationQueue::new(QueueConfig {
            capacity: 2,
            ..QueueConfig::default()
        });
        let now = Utc::now();
        queue.append("g1", msg("1", now));
        queue.append("g1", msg("2", now + Duration::seconds(1)));
        queue.append("g1", msg("3", now + Duration::seconds(2)));

        let all = queue.all("g1");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message_id, "2");
        assert_eq!(all[1].message_id, "3");
    }

    #[test]
    fn range_filters_by_window_and_orders_ascending() {
        let queue = ConversationQueue::new(QueueConfig::default());
        let now = Utc::now();
        queue.append("g1", msg("1", now));
        queue.append("g1", msg("2", now + Duration::seconds(5)));
        queue.append("g1", msg("3", now + Duration::seconds(10)));

        let ranged = queue.range("g1", now + Duration::seconds(1), now + Duration::seconds(10), 10);
        assert_eq!(ranged.iter().map(|m| m.message_id.as_str()).collect::<Vec<_>>(), vec!["2", "3"]);
    }

    #[test]
    fn delete_removes_all_entries_for_key() {
        let queue = ConversationQueue::new(QueueConfig::default());
        queue.append("g1", msg("1", Utc::now()));
        queue.delete("g1");
        assert!(queue.all("g1").is_empty());
    }

    #[test]
    fn sweep_expired_evicts_stale_keys() {
        let queue = ConversationQueue::new(QueueConfig {
            ttl_secs: 0,
            ..QueueConfig::default()
        });
        queue.append("g1", msg("1", Utc::now()));
        std::thread::sleep(std::time::Duration::from_millis(10));
        queue.sweep_expired();
        assert!(queue.all("g1").is_empty());
    }
}
