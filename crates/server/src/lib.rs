//! Composition root for the conversational memory system: wires
//! `memoria-core`'s collaborator interfaces to the `memoria-llm`,
//! `memoria-persistence`, and `memoria-rag` adapters and exposes the
//! ingest/retrieve/administration surfaces described in SPEC_FULL.md
//! §6 as a plain `MemoriaCore` struct. Transport framing (HTTP, a
//! message queue, ...) is left to whatever process embeds this crate.

pub mod error;
pub mod facade;

pub use error::{ApiError, ErrorCode, ServerError};
pub use facade::{
    IngestMessage, ListPendingRequest, MemoriaCore, MemorizeResponse, ReplayPendingResponse,
    RetrieveAgenticRequest, RetrieveAgenticResponse, RetrieveMetadata, RetrieveRequest,
    RetrieveResponse, SetConversationMetaRequest, StatusResponse,
};
