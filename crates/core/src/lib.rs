//! Core types and traits for the conversational memory system.
//!
//! This crate provides foundational pieces used across every other
//! crate in the workspace:
//! - the entity model (`types`) — §3's PendingMessage, MemCell,
//!   AtomicEvent, SemanticMemory, Profile, ClusterState,
//!   ConversationStatus/Meta;
//! - the collaborator interfaces (`traits`) — C1-C5: Vectorizer,
//!   LlmClient, and the per-entity document/lexical/vector store
//!   traits that `memoria-persistence` and `memoria-rag` implement;
//! - the top-level error taxonomy (`error`).

pub mod error;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{Error, Result};

pub use traits::{
    AtomicEventStore, ClusterStateStore, ConversationMetaStore, ConversationStatusStore,
    LexicalIndex, LlmClient, LlmRequest, LlmResponse, MemCellStore, ProfileStore,
    RequestLogStore, SemanticMemoryStore, SortOrder, TokenUsage, VectorIndex, Vectorizer,
};

pub use types::{
    AtomicEvent, Cluster, ClusterState, ConversationMeta, ConversationScene, ConversationStatus,
    DataSource, Embedding, IndexRecord, MemCell, MessageRole, PendingMessage, Profile,
    ProfilePayload, RetrievalMode, Scope, ScopeFilter, ScoredHit, SearchSource, SemanticMemory,
    SyncStatus, TimeRange, TraitEntry, UserDetail,
};
