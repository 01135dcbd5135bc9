//! ScyllaDB client and connection management, grounded on the reference
//! workspace's `ScyllaClient`/`ScyllaConfig` (`crates/persistence/src/client.rs`),
//! adapted to take its settings from `memoria_config::PersistenceConfig`
//! rather than a standalone env-driven struct.

use std::sync::Arc;

use scylla::{Session, SessionBuilder};

use memoria_config::PersistenceConfig;

use crate::error::PersistenceError;
use crate::schema;

#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    keyspace: String,
    replication_factor: u8,
}

impl ScyllaClient {
    pub async fn connect(config: &PersistenceConfig) -> Result<Self, PersistenceError> {
        tracing::info!(
            hosts = ?config.scylla_hosts,
            keyspace = %config.scylla_keyspace,
            "connecting to scylladb"
        );

        let session = SessionBuilder::new()
            .known_nodes(&config.scylla_hosts)
            .build()
            .await?;

        Ok(Self {
            session: Arc::new(session),
            keyspace: config.scylla_keyspace.clone(),
            replication_factor: config.scylla_replication_factor,
        })
    }

    /// Ensure keyspace and all entity tables exist. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        schema::create_keyspace(&self.session, &self.keyspace, self.replication_factor).await?;
        schema::create_tables(&self.session, &self.keyspace).await?;
        tracing::info!(keyspace = %self.keyspace, "schema ensured");
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }
}
