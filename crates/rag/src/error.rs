//! Errors for the C1/C4/C5/C14 adapters in this crate, aggregated into
//! `memoria_core::Error` the same way `memoria-llm` and
//! `memoria-persistence` do.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("vector index error: {0}")]
    VectorIndex(String),

    #[error("lexical index error: {0}")]
    LexicalIndex(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl From<RagError> for memoria_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Embedding(_) => memoria_core::Error::ExtractionError(err.to_string()),
            _ => memoria_core::Error::TransientBackend(err.to_string()),
        }
    }
}

impl From<qdrant_client::QdrantError> for RagError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        RagError::VectorIndex(err.to_string())
    }
}

impl From<tantivy::TantivyError> for RagError {
    fn from(err: tantivy::TantivyError) -> Self {
        RagError::LexicalIndex(err.to_string())
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Connection(err.to_string())
    }
}
