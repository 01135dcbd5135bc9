//! C2 — prompt → JSON-typed response with retries (SPEC_FULL.md §4.10).
//!
//! `OllamaLlmClient` is the sole concrete `memoria_core::LlmClient`
//! implementation, grounded on the reference workspace's
//! `OllamaBackend` HTTP/retry plumbing but generalized to structured
//! JSON output validated against a caller-supplied schema.

pub mod error;
pub mod ollama;

pub use error::LlmError;
pub use ollama::OllamaLlmClient;
