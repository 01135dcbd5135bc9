//! Composition root (SPEC_FULL.md §6): wires C1-C14 into the three
//! service surfaces — ingest, retrieve, administration — as a single
//! struct with one async method per operation. Transport framing is a
//! collaborator's concern; `MemoriaCore` is the library API that
//! collaborator calls into, the same way the reference workspace's
//! `server` crate composes its other crates rather than reimplementing
//! them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use memoria_config::Settings;
use memoria_core::error::Error as CoreError;
use memoria_core::test_support::{
    FakeAtomicEventStore, FakeClusterStateStore, FakeConversationMetaStore, FakeConversationStatusStore,
    FakeLexicalIndex, FakeMemCellStore, FakeProfileStore, FakeRequestLogStore, FakeSemanticMemoryStore,
    FakeVectorIndex,
};
use memoria_core::traits::index::{LexicalIndex, VectorIndex};
use memoria_core::traits::llm_client::LlmClient;
use memoria_core::traits::store::{
    ConversationMetaStore, ConversationStatusStore, RequestLogStore, SortOrder,
};
use memoria_core::traits::vectorizer::Vectorizer;
use memoria_core::types::{
    ConversationMeta, ConversationScene, DataSource, MessageRole, PendingMessage, RetrievalMode,
    Scope, ScopeFilter, ScoredHit, SyncStatus, TimeRange, UserDetail,
};
use memoria_llm::OllamaLlmClient;
use memoria_memory::{
    ClusterManager, ConversationQueue, IngestTask, MemoryExtractor, MemorizeWorker, ProfileManager,
    SegmentationEngine, SyncService, WorkerPool,
};
use memoria_rag::{
    AgenticRequest, AgenticRetriever, LexicalIndexConfig, OllamaVectorizer, OllamaVectorizerConfig,
    QdrantVectorIndex, RetrievalEngine, RetrieveRequest as EngineRetrieveRequest,
    TantivyLexicalIndex, VectorIndexConfig,
};

use crate::error::{ApiError, ServerError};

const ALL_DATA_SOURCES: [DataSource; 3] =
    [DataSource::Episode, DataSource::EventLog, DataSource::SemanticMemory];

/// Request DTO for `memorize` (§6 "Ingest"). `group_name` is accepted
/// for parity with the wire contract but is informational only — the
/// authoritative per-group descriptive record is set via
/// `set_conversation_meta`.
#[derive(Debug, Clone)]
pub struct IngestMessage {
    pub message_id: String,
    pub create_time: DateTime<Utc>,
    pub sender: String,
    pub sender_name: Option<String>,
    pub role: Option<MessageRole>,
    pub content: String,
    pub group_id: Option<String>,
    pub group_name: Option<String>,
    pub refer_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorizeResponse {
    pub status: String,
    pub saved_count: usize,
}

#[derive(Debug, Clone)]
pub struct SetConversationMetaRequest {
    pub group_id: String,
    pub scene: ConversationScene,
    pub user_details: HashMap<String, UserDetail>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub default_timezone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub query: String,
    pub data_source: DataSource,
    pub mode: RetrievalMode,
    pub scope: Scope,
    pub caller_user_id: String,
    pub caller_group_id: Option<String>,
    pub participant_user_id: Option<String>,
    pub top_k: usize,
    pub time_range: Option<TimeRange>,
    pub radius: Option<f32>,
}

/// §7: "retrieval degrades — a single backend failure in RRF mode
/// returns partial results with a flag indicating which backend was
/// unavailable."
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrieveMetadata {
    pub degraded_backend: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetrieveResponse {
    pub memories: Vec<ScoredHit>,
    pub metadata: RetrieveMetadata,
}

#[derive(Debug, Clone)]
pub struct RetrieveAgenticRequest {
    pub query: String,
    pub user_id: String,
    pub group_id: Option<String>,
    pub top_k: usize,
    pub time_range_days: i64,
    /// Overrides the composition root's default judge model for this
    /// call only; `None` reuses the shared `AgenticRetriever`.
    pub llm_config: Option<memoria_config::LlmConfig>,
}

#[derive(Debug, Clone)]
pub struct RetrieveAgenticResponse {
    pub memories: Vec<ScoredHit>,
    pub metadata: memoria_rag::AgenticMetadata,
}

#[derive(Debug, Clone)]
pub struct ListPendingRequest {
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub limit: usize,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayPendingResponse {
    pub promoted_count: usize,
}

/// The composition root. One instance per process; every collaborator
/// it owns is `Arc`-shared so the struct itself is cheap to clone and
/// safe to hand to multiple transport handlers concurrently.
pub struct MemoriaCore {
    config: Settings,
    request_log: Arc<dyn RequestLogStore>,
    conversation_meta: Arc<dyn ConversationMetaStore>,
    #[allow(dead_code)] // read by a future transport surface's health/status endpoint
    conversation_status: Arc<dyn ConversationStatusStore>,
    queue: Arc<ConversationQueue>,
    worker_pool: WorkerPool,
    worker: Arc<MemorizeWorker>,
    retrieval: Arc<RetrievalEngine>,
    agentic: Arc<AgenticRetriever>,
    llm: Arc<dyn LlmClient>,
}

impl MemoriaCore {
    /// Wires every collaborator named in SPEC_FULL.md §2's component
    /// table. `config.persistence.enabled == false` substitutes
    /// `memoria_core::test_support`'s in-memory fakes for all seven
    /// stores and the lexical/vector indexes, per `PersistenceConfig`'s
    /// own doc comment ("local development").
    pub async fn init(config: Settings) -> Result<Self, ServerError> {
        let llm: Arc<dyn LlmClient> = Arc::new(OllamaLlmClient::new(config.llm.clone())?);

        let vectorizer: Arc<dyn Vectorizer> = Arc::new(OllamaVectorizer::new(OllamaVectorizerConfig {
            endpoint: config.llm.endpoint.clone(),
            dim: config.persistence.vector_dim,
            ..OllamaVectorizerConfig::default()
        }));

        Self::assemble(config, llm, vectorizer).await
    }

    /// Test-only entry point: wires every collaborator exactly as
    /// [`init`](Self::init) does, but takes the LLM client and
    /// vectorizer as arguments instead of building the real Ollama
    /// adapters, so scenario tests can hand it a deterministic
    /// `StubLlmClient`/`FakeVectorizer` (SPEC_FULL.md §8's "no external
    /// services" requirement).
    #[cfg(any(test, feature = "test-support"))]
    pub async fn for_testing(
        config: Settings,
        llm: Arc<dyn LlmClient>,
        vectorizer: Arc<dyn Vectorizer>,
    ) -> Result<Self, ServerError> {
        Self::assemble(config, llm, vectorizer).await
    }

    async fn assemble(
        config: Settings,
        llm: Arc<dyn LlmClient>,
        vectorizer: Arc<dyn Vectorizer>,
    ) -> Result<Self, ServerError> {
        let (
            request_log,
            mem_cell_store,
            atomic_event_store,
            semantic_memory_store,
            profile_store,
            cluster_store,
            conversation_meta,
            conversation_status,
        ): (
            Arc<dyn RequestLogStore>,
            Arc<dyn memoria_core::traits::store::MemCellStore>,
            Arc<dyn memoria_core::traits::store::AtomicEventStore>,
            Arc<dyn memoria_core::traits::store::SemanticMemoryStore>,
            Arc<dyn memoria_core::traits::store::ProfileStore>,
            Arc<dyn memoria_core::traits::store::ClusterStateStore>,
            Arc<dyn ConversationMetaStore>,
            Arc<dyn ConversationStatusStore>,
        ) = if config.persistence.enabled {
            let layer = memoria_persistence::init(&config.persistence).await?;
            (
                Arc::new(layer.request_log),
                Arc::new(layer.mem_cells),
                Arc::new(layer.atomic_events),
                Arc::new(layer.semantic_memories),
                Arc::new(layer.profiles),
                Arc::new(layer.cluster_state),
                Arc::new(layer.conversation_meta),
                Arc::new(layer.conversation_status),
            )
        } else {
            tracing::warn!("persistence disabled; every store is an in-memory fake (local development only)");
            (
                Arc::new(FakeRequestLogStore::default()),
                Arc::new(FakeMemCellStore::default()),
                Arc::new(FakeAtomicEventStore::default()),
                Arc::new(FakeSemanticMemoryStore::default()),
                Arc::new(FakeProfileStore::default()),
                Arc::new(FakeClusterStateStore::default()),
                Arc::new(FakeConversationMetaStore::default()),
                Arc::new(FakeConversationStatusStore::default()),
            )
        };

        let mut lexical: HashMap<DataSource, Arc<dyn LexicalIndex>> = HashMap::new();
        let mut vector: HashMap<DataSource, Arc<dyn VectorIndex>> = HashMap::new();
        for ds in ALL_DATA_SOURCES {
            if config.persistence.enabled {
                let lexical_config = LexicalIndexConfig {
                    index_path: Some(format!("{}/{ds:?}", config.persistence.tantivy_index_path)),
                    ..LexicalIndexConfig::default()
                };
                lexical.insert(ds, Arc::new(TantivyLexicalIndex::new(lexical_config)?));

                let vector_config = VectorIndexConfig {
                    endpoint: config.persistence.qdrant_endpoint.clone(),
                    collection: format!("{}_{ds:?}", config.persistence.qdrant_collection),
                    vector_dim: config.persistence.vector_dim,
                    api_key: config.persistence.qdrant_api_key.clone(),
                };
                let index = QdrantVectorIndex::new(vector_config).await?;
                index.ensure_collection().await?;
                vector.insert(ds, Arc::new(index));
            } else {
                lexical.insert(ds, Arc::new(FakeLexicalIndex::default()));
                vector.insert(ds, Arc::new(FakeVectorIndex::default()));
            }
        }

        let queue = Arc::new(ConversationQueue::new(config.queue.clone()));
        let segmentation = Arc::new(SegmentationEngine::new(llm.clone(), vectorizer.clone(), config.segmentation.clone()));
        let extractor = Arc::new(MemoryExtractor::new(llm.clone(), vectorizer.clone(), config.extraction.clone()));
        let cluster_manager = Arc::new(ClusterManager::new(config.clustering.clone()));
        let profile_manager = Arc::new(ProfileManager::new(llm.clone(), profile_store, config.profile.clone()));
        let sync_service = Arc::new(SyncService::new(lexical.clone(), vector.clone()));

        let worker = Arc::new(MemorizeWorker {
            request_log: request_log.clone(),
            queue: queue.clone(),
            segmentation,
            extractor,
            cluster_manager,
            cluster_store,
            profile_manager,
            mem_cell_store,
            atomic_event_store,
            semantic_memory_store,
            sync_service,
            window_limit: config.segmentation.max_tokens,
            profile_refresh_membership: config.clustering.profile_refresh_membership,
        });

        let worker_pool = WorkerPool::spawn(worker.clone(), num_shards(), channel_capacity(&config));

        let mut retrieval_engine = RetrievalEngine::new(vectorizer, config.retrieval.clone());
        for (ds, idx) in lexical {
            retrieval_engine = retrieval_engine.with_lexical(ds, idx);
        }
        for (ds, idx) in vector {
            retrieval_engine = retrieval_engine.with_vector(ds, idx);
        }
        let retrieval = Arc::new(retrieval_engine);
        let agentic = Arc::new(AgenticRetriever::new(retrieval.clone(), llm.clone()));

        Ok(Self {
            config,
            request_log,
            conversation_meta,
            conversation_status,
            queue,
            worker_pool,
            worker,
            retrieval,
            agentic,
            llm,
        })
    }

    /// §6 `memorize`. Validates required fields, tolerates a
    /// `refer_list` entry pointing at an unknown message (§7
    /// InvalidInput note: dropped, not rejected), and is idempotent on
    /// `message_id` (§7 Conflict).
    pub async fn memorize(&self, msg: IngestMessage) -> Result<MemorizeResponse, ApiError> {
        let request_id = Uuid::new_v4().to_string();

        if msg.message_id.is_empty() || msg.sender.is_empty() || msg.content.is_empty() {
            return Err(ApiError::from_core(
                CoreError::invalid_input("message_id, sender and content are required"),
                request_id,
            ));
        }

        let existing = self
            .request_log
            .get(&msg.message_id)
            .await
            .map_err(|e| ApiError::from_core(e, request_id.clone()))?;
        if existing.is_some() {
            tracing::info!(message_id = %msg.message_id, "memorize: duplicate message_id, idempotent no-op");
            return Ok(MemorizeResponse {
                status: "duplicate".to_string(),
                saved_count: 0,
            });
        }

        let mut refer_list = Vec::with_capacity(msg.refer_list.len());
        for id in msg.refer_list {
            match self.request_log.get(&id).await {
                Ok(Some(_)) => refer_list.push(id),
                Ok(None) => tracing::warn!(request_id = %request_id, unknown_ref = %id, "memorize: dropping refer_list entry pointing to unknown message"),
                Err(e) => tracing::warn!(request_id = %request_id, %e, "memorize: failed to validate a refer_list entry, dropping it"),
            }
        }

        let pending = PendingMessage {
            message_id: msg.message_id,
            group_id: msg.group_id,
            sender_id: msg.sender,
            sender_name: msg.sender_name,
            role: msg.role.unwrap_or(MessageRole::User),
            content: msg.content,
            created_at: msg.create_time,
            refer_list,
            status: SyncStatus::Recorded,
        };

        let outcome = self
            .worker_pool
            .submit_and_await(IngestTask {
                request_id: request_id.clone(),
                message: pending,
            })
            .await
            .map_err(|e| ApiError::from_core(e, request_id))?;

        metrics::counter!("memoria_ingest_total").increment(1);
        if outcome.boundary {
            metrics::counter!("memoria_boundary_total").increment(1);
        }

        Ok(MemorizeResponse {
            status: "ok".to_string(),
            saved_count: outcome.synced_records,
        })
    }

    /// §6 `set_conversation_meta`.
    pub async fn set_conversation_meta(&self, req: SetConversationMetaRequest) -> Result<StatusResponse, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        if req.group_id.is_empty() {
            return Err(ApiError::from_core(CoreError::invalid_input("group_id is required"), request_id));
        }

        let meta = ConversationMeta {
            group_id: req.group_id,
            scene: req.scene,
            user_details: req.user_details,
            tags: req.tags,
            created_at: req.created_at,
            default_timezone: req.default_timezone,
        };

        self.conversation_meta
            .upsert(&meta)
            .await
            .map_err(|e| ApiError::from_core(e, request_id))?;

        Ok(StatusResponse { status: "ok".to_string() })
    }

    /// §6 `retrieve`. In `Rrf` mode, a single backend failure degrades
    /// to the surviving backend's results rather than failing the
    /// whole call (§7).
    pub async fn retrieve(&self, req: RetrieveRequest) -> Result<RetrieveResponse, ApiError> {
        let request_id = Uuid::new_v4().to_string();

        let mut filter = ScopeFilter::resolve(req.scope, &req.caller_user_id, req.caller_group_id.as_deref());
        if let Some(participant) = req.participant_user_id.clone() {
            filter = filter.with_participant(participant);
        }

        let engine_req = EngineRetrieveRequest {
            query: req.query.clone(),
            data_source: req.data_source,
            mode: req.mode,
            filter: filter.clone(),
            top_k: req.top_k,
            time_range: req.time_range,
            radius: req.radius,
        };

        match self.retrieval.retrieve(engine_req).await {
            Ok(hits) => Ok(RetrieveResponse {
                memories: hits,
                metadata: RetrieveMetadata::default(),
            }),
            Err(e) if req.mode == RetrievalMode::Rrf => degrade_rrf(&self.retrieval, req, filter, e, &request_id).await,
            Err(e) => Err(ApiError::from_core(e, request_id)),
        }
    }

    /// §6 `retrieve_agentic`.
    pub async fn retrieve_agentic(&self, req: RetrieveAgenticRequest) -> Result<RetrieveAgenticResponse, ApiError> {
        let request_id = Uuid::new_v4().to_string();

        let scope = if req.group_id.is_some() { Scope::Group } else { Scope::Personal };
        let filter = ScopeFilter::resolve(scope, &req.user_id, req.group_id.as_deref());
        let time_range = Some(TimeRange {
            start: Utc::now() - chrono::Duration::days(req.time_range_days.max(0)),
            end: Utc::now(),
        });

        let retriever: Arc<AgenticRetriever> = match req.llm_config {
            Some(cfg) => {
                let llm: Arc<dyn LlmClient> = Arc::new(
                    OllamaLlmClient::new(cfg)
                        .map_err(|e| ApiError::from_core(CoreError::TransientBackend(e.to_string()), request_id.clone()))?,
                );
                Arc::new(AgenticRetriever::new(self.retrieval.clone(), llm))
            },
            None => self.agentic.clone(),
        };

        let timeout = Duration::from_secs(self.config.llm.timeout_secs.saturating_mul(3));
        let result = retriever
            .retrieve(AgenticRequest {
                query: req.query,
                data_source: DataSource::Episode,
                filter,
                top_k: req.top_k,
                max_rounds: self.config.retrieval.max_rounds,
                deadline: timeout,
                time_range,
            })
            .await
            .map_err(|e| ApiError::from_core(e, request_id))?;

        Ok(RetrieveAgenticResponse {
            memories: result.hits,
            metadata: result.metadata,
        })
    }

    /// §6 `list_pending`. "Pending" means not yet consumed into a
    /// MemCell: `Recorded` (logged, not yet windowed) or `InWindow`.
    pub async fn list_pending(&self, req: ListPendingRequest) -> Result<Vec<PendingMessage>, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let order = if req.ascending { SortOrder::Ascending } else { SortOrder::Descending };

        self.request_log
            .find_pending(
                req.user_id.as_deref(),
                req.group_id.as_deref(),
                &[SyncStatus::Recorded, SyncStatus::InWindow],
                req.limit,
                order,
            )
            .await
            .map_err(|e| ApiError::from_core(e, request_id))
    }

    /// §6 `replay_pending`. Idempotent: re-drives the worker directly
    /// (bypassing the pool's queue so the caller gets a synchronous
    /// count) on every already-recorded message for `group_id`, in
    /// arrival order; `promoted_count` is how many of those replays
    /// crossed a segmentation boundary.
    pub async fn replay_pending(&self, group_id: &str) -> Result<ReplayPendingResponse, ApiError> {
        let request_id = Uuid::new_v4().to_string();

        let pending = self
            .request_log
            .find_pending(
                None,
                Some(group_id),
                &[SyncStatus::Recorded, SyncStatus::InWindow],
                usize::MAX,
                SortOrder::Ascending,
            )
            .await
            .map_err(|e| ApiError::from_core(e, request_id.clone()))?;

        let shutdown = tokio_util::sync::CancellationToken::new();
        let mut promoted_count = 0usize;
        for message in pending {
            let outcome = self
                .worker
                .process(
                    IngestTask {
                        request_id: request_id.clone(),
                        message,
                    },
                    &shutdown,
                )
                .await
                .map_err(|e| ApiError::from_core(e, request_id.clone()))?;
            if outcome.boundary {
                promoted_count += 1;
            }
        }

        Ok(ReplayPendingResponse { promoted_count })
    }

    /// Gracefully drains the worker pool, giving in-flight tasks up to
    /// `deadline` before cancelling outstanding LLM calls.
    pub async fn shutdown(self, deadline: Duration) {
        self.worker_pool.shutdown(deadline).await;
    }
}

fn num_shards() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn channel_capacity(config: &Settings) -> usize {
    config.queue.capacity.max(16)
}

/// Retries a failed RRF query as bm25-only and embedding-only;
/// returns whichever survives, flagging the other as unavailable
/// (§7: "a single backend failure in RRF mode returns partial results
/// with a flag"). A free function (rather than a `MemoriaCore` method)
/// so it only depends on the `RetrievalEngine` it degrades, which
/// keeps it independently testable against a hand-wired engine.
async fn degrade_rrf(
    retrieval: &RetrievalEngine,
    req: RetrieveRequest,
    filter: ScopeFilter,
    original_err: CoreError,
    request_id: &str,
) -> Result<RetrieveResponse, ApiError> {
    let bm25_req = EngineRetrieveRequest {
        query: req.query.clone(),
        data_source: req.data_source,
        mode: RetrievalMode::Bm25,
        filter: filter.clone(),
        top_k: req.top_k,
        time_range: req.time_range,
        radius: req.radius,
    };
    let embedding_req = EngineRetrieveRequest {
        query: req.query,
        data_source: req.data_source,
        mode: RetrievalMode::Embedding,
        filter,
        top_k: req.top_k,
        time_range: req.time_range,
        radius: req.radius,
    };

    let (bm25, embedding) = tokio::join!(retrieval.retrieve(bm25_req), retrieval.retrieve(embedding_req));

    match (bm25, embedding) {
        (Ok(hits), Err(e)) => {
            tracing::warn!(request_id, %e, "retrieve: embedding backend unavailable, degrading to bm25-only");
            Ok(RetrieveResponse {
                memories: hits,
                metadata: RetrieveMetadata { degraded_backend: Some("embedding".to_string()) },
            })
        },
        (Err(e), Ok(hits)) => {
            tracing::warn!(request_id, %e, "retrieve: bm25 backend unavailable, degrading to embedding-only");
            Ok(RetrieveResponse {
                memories: hits,
                metadata: RetrieveMetadata { degraded_backend: Some("bm25".to_string()) },
            })
        },
        (Err(_), Err(_)) => Err(ApiError::from_core(original_err, request_id)),
        (Ok(_), Ok(_)) => {
            // The fused call failed for a reason unrelated to either
            // backend (e.g. a fusion-stage bug); both legs alone
            // succeeding means there is nothing left to degrade to.
            Err(ApiError::from_core(original_err, request_id))
        },
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use memoria_core::test_support::FakeVectorizer;
    use memoria_core::types::Embedding;

    use super::*;

    /// Always fails `search`, succeeds at `upsert`/`delete` — used to
    /// simulate a single unavailable vector backend (S6).
    #[derive(Default)]
    struct FailingVectorIndex;

    #[async_trait]
    impl VectorIndex for FailingVectorIndex {
        async fn upsert(&self, _records: &[memoria_core::types::IndexRecord]) -> memoria_core::Result<()> {
            Ok(())
        }

        async fn search(
            &self,
            _query: &Embedding,
            _filter: &ScopeFilter,
            _top_k: usize,
            _radius: Option<f32>,
        ) -> memoria_core::Result<Vec<ScoredHit>> {
            Err(CoreError::TransientBackend("qdrant unreachable".into()))
        }

        async fn delete(&self, _ids: &[String]) -> memoria_core::Result<()> {
            Ok(())
        }
    }

    fn rrf_request() -> RetrieveRequest {
        RetrieveRequest {
            query: "berlin".to_string(),
            data_source: DataSource::SemanticMemory,
            mode: RetrievalMode::Rrf,
            scope: Scope::Personal,
            caller_user_id: "u1".to_string(),
            caller_group_id: None,
            participant_user_id: None,
            top_k: 5,
            time_range: None,
            radius: None,
        }
    }

    #[tokio::test]
    async fn rrf_degrades_to_bm25_when_vector_backend_fails() {
        let vectorizer: Arc<dyn Vectorizer> = Arc::new(FakeVectorizer::default());
        let engine = RetrievalEngine::new(vectorizer, memoria_config::RetrievalConfig::default())
            .with_lexical(DataSource::SemanticMemory, Arc::new(memoria_core::test_support::FakeLexicalIndex::default()))
            .with_vector(DataSource::SemanticMemory, Arc::new(FailingVectorIndex));

        let req = rrf_request();
        let filter = ScopeFilter::resolve(req.scope, &req.caller_user_id, req.caller_group_id.as_deref());
        let engine_req = EngineRetrieveRequest {
            query: req.query.clone(),
            data_source: req.data_source,
            mode: req.mode,
            filter: filter.clone(),
            top_k: req.top_k,
            time_range: req.time_range,
            radius: req.radius,
        };

        let original_err = engine
            .retrieve(engine_req)
            .await
            .expect_err("rrf fusion should fail when one leg errors");

        let result = degrade_rrf(&engine, req, filter, original_err, "req-1").await.expect("degrade should recover via bm25");
        assert_eq!(result.metadata.degraded_backend.as_deref(), Some("embedding"));
    }
}
