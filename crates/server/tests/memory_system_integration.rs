//! Integration tests for the composition root's ingest/retrieve/
//! administration surfaces, driven entirely against in-memory fakes
//! (no ScyllaDB/Qdrant/Tantivy/LLM network calls), following the
//! reference workspace's `crates/agent/tests/voice_pipeline_integration.rs`
//! placement convention.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use memoria_config::Settings;
use memoria_core::test_support::{FakeVectorizer, StubLlmClient};
use memoria_core::traits::llm_client::LlmClient;
use memoria_core::traits::vectorizer::Vectorizer;
use memoria_core::types::{ConversationScene, DataSource, RetrievalMode, Scope};
use memoria_server::{
    IngestMessage, ListPendingRequest, MemoriaCore, RetrieveRequest, SetConversationMetaRequest,
};

fn test_core_deps() -> (Arc<dyn LlmClient>, Arc<dyn Vectorizer>) {
    // Segmentation never fires for windows below `min_window` (3), so
    // these tests never drive an LLM call; the stub carries no canned
    // responses and would fail loudly (`stub exhausted`) if one leg
    // did.
    (Arc::new(StubLlmClient::new(vec![])), Arc::new(FakeVectorizer::default()))
}

fn ingest_message(message_id: &str, sender: &str, content: &str, group_id: &str) -> IngestMessage {
    IngestMessage {
        message_id: message_id.to_string(),
        create_time: Utc::now(),
        sender: sender.to_string(),
        sender_name: Some(sender.to_string()),
        role: None,
        content: content.to_string(),
        group_id: Some(group_id.to_string()),
        group_name: None,
        refer_list: vec![],
    }
}

/// P7: ingesting the same message_id twice leaves the system in a
/// state identical to ingesting it once.
#[tokio::test]
async fn memorize_is_idempotent_on_message_id() {
    let (llm, vectorizer) = test_core_deps();
    let core = MemoriaCore::for_testing(Settings::default(), llm, vectorizer)
        .await
        .expect("composition root should assemble against in-memory fakes");

    let msg = ingest_message("m-1", "alice", "hello there", "group-a");

    let first = core.memorize(msg.clone()).await.expect("first ingest should succeed");
    assert_eq!(first.status, "ok");

    let second = core.memorize(msg).await.expect("duplicate ingest should not error");
    assert_eq!(second.status, "duplicate");
    assert_eq!(second.saved_count, 0);

    let pending = core
        .list_pending(ListPendingRequest {
            user_id: None,
            group_id: Some("group-a".to_string()),
            limit: 10,
            ascending: true,
        })
        .await
        .expect("list_pending should succeed");
    assert_eq!(pending.len(), 1, "the duplicate must not create a second pending row");
}

/// §6 `memorize` rejects messages missing required fields before
/// touching the worker pool.
#[tokio::test]
async fn memorize_rejects_missing_required_fields() {
    let (llm, vectorizer) = test_core_deps();
    let core = MemoriaCore::for_testing(Settings::default(), llm, vectorizer).await.unwrap();

    let mut msg = ingest_message("m-2", "alice", "hi", "group-a");
    msg.content = String::new();

    let err = core.memorize(msg).await.expect_err("empty content must be rejected");
    assert_eq!(err.code, memoria_server::ErrorCode::InvalidInput);
}

/// A `refer_list` entry pointing at an unknown message is dropped,
/// not rejected (§7).
#[tokio::test]
async fn memorize_drops_dangling_refer_list_entries() {
    let (llm, vectorizer) = test_core_deps();
    let core = MemoriaCore::for_testing(Settings::default(), llm, vectorizer).await.unwrap();

    let mut msg = ingest_message("m-3", "bob", "see above", "group-a");
    msg.refer_list = vec!["does-not-exist".to_string()];

    let result = core.memorize(msg).await.expect("ingest should still succeed");
    assert_eq!(result.status, "ok");
}

#[tokio::test]
async fn set_conversation_meta_roundtrip() {
    let (llm, vectorizer) = test_core_deps();
    let core = MemoriaCore::for_testing(Settings::default(), llm, vectorizer).await.unwrap();

    let resp = core
        .set_conversation_meta(SetConversationMetaRequest {
            group_id: "group-a".to_string(),
            scene: ConversationScene::Companion,
            user_details: HashMap::new(),
            tags: vec!["onboarding".to_string()],
            created_at: Utc::now(),
            default_timezone: "UTC".to_string(),
        })
        .await
        .expect("set_conversation_meta should succeed");

    assert_eq!(resp.status, "ok");
}

/// `retrieve` against empty indexes returns an empty result set
/// rather than an error.
#[tokio::test]
async fn retrieve_against_empty_indexes_returns_no_hits() {
    let (llm, vectorizer) = test_core_deps();
    let core = MemoriaCore::for_testing(Settings::default(), llm, vectorizer).await.unwrap();

    let response = core
        .retrieve(RetrieveRequest {
            query: "anything".to_string(),
            data_source: DataSource::SemanticMemory,
            mode: RetrievalMode::Bm25,
            scope: Scope::Personal,
            caller_user_id: "alice".to_string(),
            caller_group_id: None,
            participant_user_id: None,
            top_k: 5,
            time_range: None,
            radius: None,
        })
        .await
        .expect("retrieve against an empty index should succeed with no hits");

    assert!(response.memories.is_empty());
    assert_eq!(response.metadata.degraded_backend, None);
}

/// §6 `replay_pending` is a no-op (promoted_count = 0) when nothing
/// crosses a segmentation boundary, and does not error on an empty
/// group.
#[tokio::test]
async fn replay_pending_on_empty_group_is_a_noop() {
    let (llm, vectorizer) = test_core_deps();
    let core = MemoriaCore::for_testing(Settings::default(), llm, vectorizer).await.unwrap();

    let result = core.replay_pending("nonexistent-group").await.expect("replay should not error");
    assert_eq!(result.promoted_count, 0);
}
