//! Top-level error taxonomy.
//!
//! Adapter crates (`memoria-llm`, `memoria-persistence`, `memoria-rag`)
//! define their own `thiserror` enums for the failure modes specific to
//! their transport; this enum is what the rest of the core sees once an
//! adapter error has been classified into one of the categories below.
//! `NotFound` and `Conflict` are deliberately absent — both are
//! tolerated at the call site and encoded in the success path instead
//! of as an `Err` variant.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("backend unavailable after retries: {0}")]
    TransientBackend(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("extraction failed: {0}")]
    ExtractionError(String),

    #[error("invariant violated: {0}")]
    Fatal(String),
}

// Adapter crates (memoria-llm, memoria-persistence, memoria-rag) each
// define `impl From<TheirLocalError> for Error` on their own side —
// the orphan rule permits this since the error type is local to the
// implementing crate, and it keeps this crate ignorant of adapter
// transport details.

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}
