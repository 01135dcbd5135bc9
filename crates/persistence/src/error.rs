//! Typed errors for the ScyllaDB boundary, aggregated into
//! `memoria_core::Error` at the crate edge (SPEC_FULL.md §1.1).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to connect to scylla: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("stored record could not be decoded: {0}")]
    InvalidData(String),
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<scylla::cql_to_rust::FromRowError> for PersistenceError {
    fn from(err: scylla::cql_to_rust::FromRowError) -> Self {
        PersistenceError::InvalidData(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::InvalidData(err.to_string())
    }
}

impl From<PersistenceError> for memoria_core::Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::InvalidData(_) | PersistenceError::SchemaError(_) => {
                memoria_core::Error::Fatal(err.to_string())
            }
            PersistenceError::Connection(_) | PersistenceError::Query(_) => {
                memoria_core::Error::TransientBackend(err.to_string())
            }
        }
    }
}
