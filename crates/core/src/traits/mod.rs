//! Collaborator interfaces (C1-C5) that the ingest and retrieval
//! pipelines (`memoria-memory`, `memoria-rag`) depend on by value,
//! per the constructor-injection redesign note in SPEC_FULL.md §9 —
//! no service-locator, every component takes its collaborators as
//! `Arc<dyn Trait>` parameters.

pub mod index;
pub mod llm_client;
pub mod store;
pub mod vectorizer;

pub use index::{LexicalIndex, VectorIndex};
pub use llm_client::{LlmClient, LlmRequest, LlmResponse, TokenUsage};
pub use store::{
    AtomicEventStore, ClusterStateStore, ConversationMetaStore, ConversationStatusStore,
    MemCellStore, ProfileStore, RequestLogStore, SemanticMemoryStore, SortOrder,
};
pub use vectorizer::Vectorizer;
