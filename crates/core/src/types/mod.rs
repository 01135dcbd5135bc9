//! The entity model from §3: every record the core persists, indexes,
//! or returns to a caller.

pub mod atomic_event;
pub mod cluster_state;
pub mod conversation;
pub mod embedding;
pub mod episode;
pub mod message;
pub mod profile;
pub mod query;
pub mod record;
pub mod semantic_memory;

pub use atomic_event::AtomicEvent;
pub use cluster_state::{Cluster, ClusterState};
pub use conversation::{ConversationMeta, ConversationScene, ConversationStatus, UserDetail};
pub use embedding::Embedding;
pub use episode::MemCell;
pub use message::{MessageRole, PendingMessage, SyncStatus};
pub use profile::{Profile, ProfilePayload, TraitEntry};
pub use query::{DataSource, RetrievalMode, Scope, ScopeFilter, TimeRange};
pub use record::{IndexRecord, ScoredHit, SearchSource};
pub use semantic_memory::SemanticMemory;
