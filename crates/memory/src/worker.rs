//! C12 — Memorize Worker (§4.7). Orchestrates the ingest pipeline for
//! a single message: persist + enqueue, reconstruct the window,
//! segment, and on a boundary fan out to extraction, clustering,
//! profile refresh, and indexing.
//!
//! Reference implementation per SPEC_FULL.md: a bounded
//! `tokio::sync::mpsc` channel of tasks, sharded by `group_id` hash to
//! a fixed pool of consumer tasks — preserves per-group ordering
//! (parallelism *within* a group would race with C6/C8) while letting
//! distinct groups make progress concurrently. Graceful shutdown
//! drains each shard up to a deadline via `tokio_util`'s
//! `CancellationToken` + `tokio::time::timeout`, mirroring the
//! reference workspace's channel-based pipeline wiring.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use memoria_core::error::{Error as CoreError, Result as CoreResult};
use memoria_core::traits::store::{
    AtomicEventStore, ClusterStateStore, MemCellStore, RequestLogStore, SemanticMemoryStore, SortOrder,
};
use memoria_core::types::{DataSource, PendingMessage, SyncStatus};

use crate::cluster::ClusterManager;
use crate::extractor::MemoryExtractor;
use crate::profile::ProfileManager;
use crate::queue::ConversationQueue;
use crate::segmentation::{SegmentationEngine, SegmentationOutcome};
use crate::sync::{SyncInput, SyncService};

pub struct IngestTask {
    pub request_id: String,
    pub message: PendingMessage,
}

#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub boundary: bool,
    pub event_id: Option<String>,
    pub synced_records: usize,
    pub profile_refreshed: bool,
}

/// Tracks what this task has already persisted so a cancelled task
/// can be rolled back record-by-record rather than leaving a partial
/// MemCell behind (§4.7 cancellation semantics).
#[derive(Default)]
struct Ledger {
    mem_cell_id: Option<String>,
    atomic_event_ids: Vec<String>,
    semantic_memory_ids: Vec<String>,
}

pub struct MemorizeWorker {
    pub request_log: Arc<dyn RequestLogStore>,
    pub queue: Arc<ConversationQueue>,
    pub segmentation: Arc<SegmentationEngine>,
    pub extractor: Arc<MemoryExtractor>,
    pub cluster_manager: Arc<ClusterManager>,
    pub cluster_store: Arc<dyn ClusterStateStore>,
    pub profile_manager: Arc<ProfileManager>,
    pub mem_cell_store: Arc<dyn MemCellStore>,
    pub atomic_event_store: Arc<dyn AtomicEventStore>,
    pub semantic_memory_store: Arc<dyn SemanticMemoryStore>,
    pub sync_service: Arc<SyncService>,
    pub window_limit: usize,
    /// Member count a cluster must cross a multiple of before a
    /// contributing user's profile is queued for refresh
    /// (`ClusteringConfig::profile_refresh_membership`, §4.5/§4.7).
    pub profile_refresh_membership: u64,
}

impl MemorizeWorker {
    /// §4.7 steps 1-5. Returns `Ok` once every side effect this task
    /// produced has either fully landed or been rolled back.
    pub async fn process(&self, task: IngestTask, shutdown: &CancellationToken) -> CoreResult<ProcessOutcome> {
        let true_group_id = task.message.group_id.clone();
        let group_id = match &true_group_id {
            Some(g) => g.clone(),
            None => {
                // Personal (non-group) messages still go through the
                // log + window machinery, keyed by sender_id instead.
                task.message.sender_id.clone()
            }
        };

        // Step 1: persist to C7 (idempotent on message_id, §7
        // Conflict) and append to C6.
        let mut message = task.message;
        message.status = SyncStatus::Recorded;
        self.request_log.insert(&message).await?;
        message.status = SyncStatus::InWindow;
        self.request_log.mark_status(&[message.message_id.clone()], SyncStatus::InWindow).await?;
        self.queue.append(&group_id, message.clone());

        if shutdown.is_cancelled() {
            return Ok(ProcessOutcome::default());
        }

        // Step 2: reconstruct the window from C6, falling back to C7
        // on a cold start where the queue hasn't been warmed yet.
        let mut window = self.queue.all(&group_id);
        if window.is_empty() {
            window = self
                .request_log
                .find_pending(
                    None,
                    Some(&group_id),
                    &[SyncStatus::Recorded, SyncStatus::InWindow],
                    self.window_limit,
                    SortOrder::Ascending,
                )
                .await?;
        }

        // Step 3.
        let outcome = self.segmentation.segment(true_group_id.as_deref(), &group_id, &window).await?;

        let SegmentationOutcome::Boundary { cell, consumed_ids, retained_ids } = outcome else {
            return Ok(ProcessOutcome::default());
        };

        let mut ledger = Ledger::default();
        match self.run_boundary(&group_id, cell, shutdown, &mut ledger).await {
            Ok(mut result) => {
                self.request_log.mark_status(&consumed_ids, SyncStatus::Consumed).await?;
                self.request_log.mark_status(&retained_ids, SyncStatus::InWindow).await?;
                self.queue.delete(&group_id);
                for retained in window.iter().filter(|m| retained_ids.contains(&m.message_id)) {
                    self.queue.append(&group_id, retained.clone());
                }
                result.boundary = true;
                Ok(result)
            }
            Err(e) => {
                self.rollback(&ledger).await;
                Err(e)
            }
        }
    }

    /// Step 4: persist the MemCell, run extraction, clustering,
    /// conditional profile refresh, and indexing. Bails out (for
    /// rollback) the moment `shutdown` is observed between stages.
    async fn run_boundary(
        &self,
        group_id: &str,
        cell: memoria_core::types::MemCell,
        shutdown: &CancellationToken,
        ledger: &mut Ledger,
    ) -> CoreResult<ProcessOutcome> {
        // 4a.
        self.mem_cell_store.insert(&cell).await?;
        ledger.mem_cell_id = Some(cell.event_id.clone());

        if shutdown.is_cancelled() {
            return Err(memoria_core::error::Error::TransientBackend("shutdown during boundary processing".into()));
        }

        // 4b.
        let extracted = self.extractor.extract(&cell).await?;
        for event in &extracted.atomic_events {
            self.atomic_event_store.insert(event).await?;
            ledger.atomic_event_ids.push(event.log_id.clone());
        }
        for memory in &extracted.semantic_memories {
            self.semantic_memory_store.insert(memory).await?;
            ledger.semantic_memory_ids.push(memory.memory_id.clone());
        }

        // 4c.
        let state = self.cluster_store.load(group_id).await?.unwrap_or_else(|| {
            memoria_core::types::ClusterState::new(group_id.to_string())
        });
        let assignment = self.cluster_manager.assign(state, &cell);
        self.cluster_store.save(&assignment.state).await?;

        // 4d: a user's profile is refreshed once their cluster
        // reaches a multiple of the configured membership threshold.
        let cluster = &assignment.state.clusters[&assignment.cluster_id];
        let threshold = self.profile_refresh_membership;
        let mut profile_refreshed = false;
        if threshold > 0 && cluster.count % threshold == 0 {
            for user_id in &cell.participants {
                let deltas: Vec<_> = extracted
                    .profile_deltas
                    .iter()
                    .filter(|d| &d.user_id == user_id)
                    .cloned()
                    .collect();
                self.profile_manager
                    .rebuild(user_id, group_id, &deltas)
                    .await
                    .map(|_| profile_refreshed = true)
                    .unwrap_or_else(|e| {
                        tracing::warn!(user_id, group_id, %e, "profile refresh failed, will retry on next boundary");
                    });
            }
        }

        // 4e: hand everything new to C13.
        let mut synced = 0usize;
        let cell_sync = SyncInput {
            id: cell.event_id.clone(),
            data_source: DataSource::Episode,
            user_id: cell.user_id.clone(),
            group_id: cell.group_id.clone(),
            participants: cell.participants.clone(),
            primary_text: cell.episode.clone(),
            embedding: Some(cell.embedding.clone()),
            timestamp: cell.timestamp,
        };
        self.sync_service.sync(cell_sync).await?;
        synced += 1;

        for event in &extracted.atomic_events {
            self.sync_service
                .sync(SyncInput {
                    id: event.log_id.clone(),
                    data_source: DataSource::EventLog,
                    user_id: event.user_id.clone(),
                    group_id: event.group_id.clone(),
                    participants: event.participants.clone(),
                    primary_text: event.atomic_fact.clone(),
                    embedding: Some(event.embedding.clone()),
                    timestamp: event.timestamp,
                })
                .await?;
            synced += 1;
        }
        for memory in &extracted.semantic_memories {
            self.sync_service
                .sync(SyncInput {
                    id: memory.memory_id.clone(),
                    data_source: DataSource::SemanticMemory,
                    user_id: memory.user_id.clone(),
                    group_id: memory.group_id.clone(),
                    participants: Default::default(),
                    primary_text: memory.content.clone(),
                    embedding: Some(memory.embedding.clone()),
                    timestamp: memory.start_time,
                })
                .await?;
            synced += 1;
        }

        Ok(ProcessOutcome {
            boundary: true,
            event_id: Some(cell.event_id),
            synced_records: synced,
            profile_refreshed,
        })
    }

    async fn rollback(&self, ledger: &Ledger) {
        if let Some(ref event_id) = ledger.mem_cell_id {
            if let Err(e) = self.mem_cell_store.delete(event_id).await {
                tracing::warn!(event_id, %e, "rollback: failed to delete MemCell");
            }
        }
        for log_id in &ledger.atomic_event_ids {
            if let Err(e) = self.atomic_event_store.delete(log_id).await {
                tracing::warn!(log_id, %e, "rollback: failed to delete AtomicEvent");
            }
        }
        for memory_id in &ledger.semantic_memory_ids {
            if let Err(e) = self.semantic_memory_store.delete(memory_id).await {
                tracing::warn!(memory_id, %e, "rollback: failed to delete SemanticMemory");
            }
        }
    }
}

type Reply = oneshot::Sender<CoreResult<ProcessOutcome>>;

/// A fixed pool of consumers, one per shard, each pulling from its own
/// bounded `mpsc::Receiver` — distinct groups hash to distinct shards
/// and therefore never block on each other; a single group always
/// lands on the same shard so its tasks are processed in FIFO order.
pub struct WorkerPool {
    senders: Vec<mpsc::Sender<(IngestTask, Option<Reply>)>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn spawn(worker: Arc<MemorizeWorker>, shard_count: usize, channel_capacity: usize) -> Self {
        let shutdown = CancellationToken::new();
        let mut senders = Vec::with_capacity(shard_count);

        for _ in 0..shard_count {
            let (tx, mut rx) = mpsc::channel::<(IngestTask, Option<Reply>)>(channel_capacity);
            let worker = worker.clone();
            let shard_shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = shard_shutdown.cancelled() => break,
                        maybe_item = rx.recv() => {
                            let Some((task, reply)) = maybe_item else { break };
                            let result = worker.process(task, &shard_shutdown).await;
                            if let Err(ref e) = result {
                                tracing::warn!(%e, "memorize task failed");
                            }
                            if let Some(tx) = reply {
                                let _ = tx.send(result);
                            }
                        }
                    }
                }
            });
            senders.push(tx);
        }

        Self { senders, shutdown }
    }

    /// Fire-and-forget enqueue; the task is processed in its shard's
    /// FIFO order but the caller doesn't learn the outcome.
    pub async fn submit(&self, task: IngestTask) -> CoreResult<()> {
        let shard = self.shard_for(&task.message);
        self.senders[shard]
            .send((task, None))
            .await
            .map_err(|_| CoreError::TransientBackend("memorize worker pool shut down".into()))
    }

    /// Enqueue `task` and wait for its `ProcessOutcome`, still ordered
    /// behind any tasks already queued for the same shard. Used by the
    /// composition root's synchronous `memorize`/`replay_pending`
    /// surfaces, which must report `saved_count`/`promoted_count`.
    pub async fn submit_and_await(&self, task: IngestTask) -> CoreResult<ProcessOutcome> {
        let shard = self.shard_for(&task.message);
        let (tx, rx) = oneshot::channel();
        self.senders[shard]
            .send((task, Some(tx)))
            .await
            .map_err(|_| CoreError::TransientBackend("memorize worker pool shut down".into()))?;
        rx.await
            .map_err(|_| CoreError::TransientBackend("memorize worker task dropped before completion".into()))?
    }

    fn shard_for(&self, message: &PendingMessage) -> usize {
        let key = message.group_id.as_deref().unwrap_or(&message.sender_id);
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.senders.len()
    }

    /// Stops accepting new submissions and gives in-flight tasks up
    /// to `deadline` to finish before cancelling the shards' in-flight
    /// LLM calls (§4.7 cancellation semantics).
    pub async fn shutdown(self, deadline: Duration) {
        drop(self.senders);
        tokio::time::sleep(deadline).await;
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memoria_config::{ClusteringConfig, ExtractionConfig, ProfileConfig, SegmentationConfig};
    use memoria_core::test_support::{
        FakeClusterStateStore, FakeMemCellStore, FakeProfileStore, FakeRequestLogStore, FakeVectorizer, StubLlmClient,
    };
    use memoria_core::traits::index::{LexicalIndex, VectorIndex};
    use memoria_core::types::{MessageRole, ScopeFilter, ScoredHit};
    use serde_json::json;
    use std::collections::HashMap;

    struct NoopLexical;
    #[async_trait::async_trait]
    impl LexicalIndex for NoopLexical {
        async fn bulk_index(&self, _r: &[memoria_core::types::IndexRecord]) -> CoreResult<()> {
            Ok(())
        }
        async fn search(&self, _q: &str, _f: &ScopeFilter, _k: usize) -> CoreResult<Vec<ScoredHit>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _ids: &[String]) -> CoreResult<()> {
            Ok(())
        }
    }
    struct NoopVector;
    #[async_trait::async_trait]
    impl VectorIndex for NoopVector {
        async fn upsert(&self, _r: &[memoria_core::types::IndexRecord]) -> CoreResult<()> {
            Ok(())
        }
        async fn search(
            &self,
            _q: &memoria_core::types::Embedding,
            _f: &ScopeFilter,
            _k: usize,
            _r: Option<f32>,
        ) -> CoreResult<Vec<ScoredHit>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _ids: &[String]) -> CoreResult<()> {
            Ok(())
        }
    }

    fn worker(llm_responses: Vec<serde_json::Value>) -> MemorizeWorker {
        worker_with_profile_store(llm_responses, Arc::new(FakeProfileStore::default()))
    }

    fn worker_with_profile_store(
        llm_responses: Vec<serde_json::Value>,
        profile_store: Arc<FakeProfileStore>,
    ) -> MemorizeWorker {
        let llm = Arc::new(StubLlmClient::new(llm_responses));
        let vectorizer = Arc::new(FakeVectorizer::default());
        let segmentation = Arc::new(SegmentationEngine::new(
            llm.clone(),
            vectorizer.clone(),
            SegmentationConfig {
                min_window: 1,
                min_span_secs: 0,
                ..SegmentationConfig::default()
            },
        ));
        let extractor = Arc::new(MemoryExtractor::new(llm.clone(), vectorizer.clone(), ExtractionConfig::default()));
        let cluster_manager = Arc::new(ClusterManager::new(ClusteringConfig::default()));
        let profile_manager = Arc::new(ProfileManager::new(llm, profile_store, ProfileConfig::default()));

        let mut lexical: HashMap<DataSource, Arc<dyn LexicalIndex>> = HashMap::new();
        let mut vector: HashMap<DataSource, Arc<dyn VectorIndex>> = HashMap::new();
        for ds in [DataSource::Episode, DataSource::EventLog, DataSource::SemanticMemory] {
            lexical.insert(ds, Arc::new(NoopLexical));
            vector.insert(ds, Arc::new(NoopVector));
        }
        let sync_service = Arc::new(SyncService::new(lexical, vector));

        MemorizeWorker {
            request_log: Arc::new(FakeRequestLogStore::default()),
            queue: Arc::new(ConversationQueue::new(memoria_config::QueueConfig::default())),
            segmentation,
            extractor,
            cluster_manager,
            cluster_store: Arc::new(FakeClusterStateStore::default()),
            profile_manager,
            mem_cell_store: Arc::new(FakeMemCellStore::default()),
            atomic_event_store: Arc::new(memoria_core::test_support::FakeAtomicEventStore::default()),
            semantic_memory_store: Arc::new(memoria_core::test_support::FakeSemanticMemoryStore::default()),
            sync_service,
            window_limit: 100,
            profile_refresh_membership: ClusteringConfig::default().profile_refresh_membership,
        }
    }

    #[tokio::test]
    async fn no_boundary_leaves_message_in_window() {
        let worker = worker(vec![json!({ "decision": "no_boundary" })]);
        let shutdown = CancellationToken::new();
        let task = IngestTask {
            request_id: "r1".to_string(),
            message: PendingMessage::new("m1", "u1", MessageRole::User, "hi", Utc::now()),
        };
        let outcome = worker.process(task, &shutdown).await.unwrap();
        assert!(!outcome.boundary);
        assert_eq!(worker.queue.all("u1").len(), 1);
    }

    #[tokio::test]
    async fn boundary_persists_mem_cell_and_syncs_records() {
        let worker = worker(vec![
            json!({
                "decision": "boundary",
                "split_index": 1,
                "subject": "s",
                "summary": "s",
                "episode": "a short episode",
                "participants": ["u1"],
                "keywords": []
            }),
            json!({ "events": [] }),
            json!({ "memories": [] }),
            json!({ "deltas": [] }),
        ]);
        let shutdown = CancellationToken::new();
        let task = IngestTask {
            request_id: "r1".to_string(),
            message: PendingMessage::new("m1", "u1", MessageRole::User, "hi", Utc::now()),
        };
        let outcome = worker.process(task, &shutdown).await.unwrap();
        assert!(outcome.boundary);
        assert!(outcome.event_id.is_some());
        assert_eq!(outcome.synced_records, 1);

        let cell = worker.mem_cell_store.get(&outcome.event_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(cell.user_id.as_deref(), Some("u1"), "personal stream must tag user_id, not group_id");
        assert_eq!(cell.group_id, None);
    }

    #[tokio::test]
    async fn group_boundary_tags_group_id_not_user_id() {
        let worker = worker(vec![
            json!({
                "decision": "boundary",
                "split_index": 1,
                "subject": "s",
                "summary": "s",
                "episode": "a short episode",
                "participants": ["u1"],
                "keywords": []
            }),
            json!({ "events": [] }),
            json!({ "memories": [] }),
            json!({ "deltas": [] }),
        ]);
        let shutdown = CancellationToken::new();
        let mut message = PendingMessage::new("m1", "u1", MessageRole::User, "hi", Utc::now());
        message.group_id = Some("g1".to_string());
        let task = IngestTask { request_id: "r1".to_string(), message };

        let outcome = worker.process(task, &shutdown).await.unwrap();
        let cell = worker.mem_cell_store.get(&outcome.event_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(cell.group_id.as_deref(), Some("g1"));
        assert_eq!(cell.user_id, None);
    }

    #[tokio::test]
    async fn profile_refresh_passes_extracted_deltas_for_the_matching_user() {
        let profile_store = Arc::new(FakeProfileStore::default());
        let worker = worker_with_profile_store(
            vec![
                json!({
                    "decision": "boundary",
                    "split_index": 1,
                    "subject": "s",
                    "summary": "s",
                    "episode": "a short episode",
                    "participants": ["u1"],
                    "keywords": []
                }),
                json!({ "events": [] }),
                json!({ "memories": [] }),
                json!({
                    "deltas": [
                        { "user_id": "u1", "category": "occupation", "value": "pilot", "evidence": "I fly planes" }
                    ]
                }),
                json!({ "traits": { "occupation": [{ "value": "pilot", "evidences": ["I fly planes"] }] } }),
            ],
            profile_store.clone(),
        );
        let shutdown = CancellationToken::new();
        let task = IngestTask {
            request_id: "r1".to_string(),
            message: PendingMessage::new("m1", "u1", MessageRole::User, "hi", Utc::now()),
        };
        let outcome = worker.process(task, &shutdown).await.unwrap();
        assert!(outcome.profile_refreshed);

        let profile = profile_store.get_latest("u1", "u1").await.unwrap();
        let profile = profile.expect("rebuild should have persisted a profile for u1");
        assert!(profile.payload.0.contains_key("occupation"));
    }
}
