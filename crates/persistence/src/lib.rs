//! C3 — ScyllaDB-backed document stores for every entity in §3,
//! grounded on the reference workspace's `ScyllaClient`/`PersistenceLayer`
//! composition (`crates/persistence/src/client.rs`, `lib.rs`).

pub mod atomic_event;
pub mod client;
pub mod cluster_state;
pub mod conversation;
pub mod error;
pub mod mem_cell;
pub mod profile;
pub mod request_log;
pub mod schema;
pub mod semantic_memory;

pub use atomic_event::ScyllaAtomicEventStore;
pub use client::ScyllaClient;
pub use cluster_state::ScyllaClusterStateStore;
pub use conversation::{ScyllaConversationMetaStore, ScyllaConversationStatusStore};
pub use error::PersistenceError;
pub use mem_cell::ScyllaMemCellStore;
pub use profile::ScyllaProfileStore;
pub use request_log::ScyllaRequestLogStore;
pub use semantic_memory::ScyllaSemanticMemoryStore;

use memoria_config::PersistenceConfig;

/// Every document store the memory system needs, backed by one shared
/// ScyllaDB session.
pub struct PersistenceLayer {
    pub request_log: ScyllaRequestLogStore,
    pub mem_cells: ScyllaMemCellStore,
    pub atomic_events: ScyllaAtomicEventStore,
    pub semantic_memories: ScyllaSemanticMemoryStore,
    pub profiles: ScyllaProfileStore,
    pub cluster_state: ScyllaClusterStateStore,
    pub conversation_meta: ScyllaConversationMetaStore,
    pub conversation_status: ScyllaConversationStatusStore,
}

pub async fn init(config: &PersistenceConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        request_log: ScyllaRequestLogStore::new(client.clone()),
        mem_cells: ScyllaMemCellStore::new(client.clone()),
        atomic_events: ScyllaAtomicEventStore::new(client.clone()),
        semantic_memories: ScyllaSemanticMemoryStore::new(client.clone()),
        profiles: ScyllaProfileStore::new(client.clone()),
        cluster_state: ScyllaClusterStateStore::new(client.clone()),
        conversation_meta: ScyllaConversationMetaStore::new(client.clone()),
        conversation_status: ScyllaConversationStatusStore::new(client),
    })
}
