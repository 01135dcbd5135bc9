//! C6-C13 — the ingest pipeline: a bounded conversation queue, the
//! segmentation/extraction/clustering/profile decision components,
//! the orchestrating Memorize Worker, and the Sync Service that feeds
//! `memoria-rag`'s indexes (SPEC_FULL.md §4.1-§4.8).

pub mod cluster;
pub mod error;
pub mod extractor;
pub mod profile;
pub mod queue;
pub mod segmentation;
pub mod sync;
pub mod worker;

pub use cluster::{ClusterAssignment, ClusterManager};
pub use error::MemoryError;
pub use extractor::{ExtractionResult, MemoryExtractor, ProfileDelta};
pub use profile::ProfileManager;
pub use queue::ConversationQueue;
pub use segmentation::{SegmentationEngine, SegmentationOutcome};
pub use sync::{SyncInput, SyncResult, SyncService};
pub use worker::{IngestTask, MemorizeWorker, ProcessOutcome, WorkerPool};
