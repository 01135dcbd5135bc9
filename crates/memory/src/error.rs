//! Typed errors for the ingest pipeline, aggregated into
//! `memoria_core::Error` at the crate edge (SPEC_FULL.md §7).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("segmentation validation failed: {0}")]
    SegmentationInvalid(String),

    #[error("cluster state invariant violated: {0}")]
    ClusterInvariant(String),

    #[error("profile merge failed: {0}")]
    ProfileMerge(String),

    #[error("queue operation failed: {0}")]
    Queue(String),
}

impl From<MemoryError> for memoria_core::Error {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::SegmentationInvalid(_) | MemoryError::ProfileMerge(_) => {
                memoria_core::Error::ExtractionError(err.to_string())
            }
            MemoryError::ClusterInvariant(_) => memoria_core::Error::Fatal(err.to_string()),
            MemoryError::Queue(_) => memoria_core::Error::TransientBackend(err.to_string()),
        }
    }
}
