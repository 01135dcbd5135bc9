//! C4/C5/C14 — lexical (Tantivy) and vector (Qdrant) index adapters,
//! the Ollama-backed Vectorizer (C1), and the hybrid + agentic
//! retrieval engine (SPEC_FULL.md §4.8/§4.9/§4.10).

pub mod agentic;
pub mod error;
pub mod lexical;
pub mod retriever;
pub mod vector;
pub mod vectorizer;

pub use agentic::{AgenticMetadata, AgenticRequest, AgenticResult, AgenticRetriever};
pub use error::RagError;
pub use lexical::{LexicalIndexConfig, TantivyLexicalIndex};
pub use retriever::{RetrievalEngine, RetrieveRequest};
pub use vector::{QdrantVectorIndex, VectorIndexConfig};
pub use vectorizer::{OllamaVectorizer, OllamaVectorizerConfig};
