//! ScyllaDB schema creation.
//!
//! Every entity carries a `payload_json` column holding the
//! `serde_json`-serialized record as the source of truth; typed columns
//! exist only where they're needed to partition, cluster, or filter.
//! This mirrors the reference workspace's `sessions` table
//! (`memory_json`, `metadata_json`) rather than decomposing nested
//! structures (e.g. `MemCell::original_data`) into their own tables.

use scylla::Session;

use crate::error::PersistenceError;

pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );
    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create keyspace: {e}")))?;
    Ok(())
}

async fn run(session: &Session, query: String, what: &str) -> Result<(), PersistenceError> {
    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create {what}: {e}")))?;
    Ok(())
}

pub async fn create_tables(session: &Session, ks: &str) -> Result<(), PersistenceError> {
    // --- C7 request log ---
    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.request_log (
                message_id TEXT PRIMARY KEY,
                group_id TEXT,
                sender_id TEXT,
                status TINYINT,
                created_at TIMESTAMP,
                payload_json TEXT
            )"#
        ),
        "request_log",
    )
    .await?;

    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.request_log_by_group (
                group_id TEXT,
                status TINYINT,
                created_at TIMESTAMP,
                message_id TEXT,
                payload_json TEXT,
                PRIMARY KEY ((group_id), status, created_at, message_id)
            ) WITH CLUSTERING ORDER BY (status ASC, created_at ASC)"#
        ),
        "request_log_by_group",
    )
    .await?;

    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.request_log_by_user (
                sender_id TEXT,
                status TINYINT,
                created_at TIMESTAMP,
                message_id TEXT,
                payload_json TEXT,
                PRIMARY KEY ((sender_id), status, created_at, message_id)
            ) WITH CLUSTERING ORDER BY (status ASC, created_at ASC)"#
        ),
        "request_log_by_user",
    )
    .await?;

    // --- MemCell ---
    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.mem_cells (
                event_id TEXT PRIMARY KEY,
                group_id TEXT,
                user_id TEXT,
                timestamp TIMESTAMP,
                payload_json TEXT
            )"#
        ),
        "mem_cells",
    )
    .await?;

    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.mem_cells_by_group (
                group_id TEXT,
                timestamp TIMESTAMP,
                event_id TEXT,
                payload_json TEXT,
                PRIMARY KEY ((group_id), timestamp, event_id)
            ) WITH CLUSTERING ORDER BY (timestamp DESC)"#
        ),
        "mem_cells_by_group",
    )
    .await?;

    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.mem_cells_by_user (
                user_id TEXT,
                group_id TEXT,
                timestamp TIMESTAMP,
                event_id TEXT,
                payload_json TEXT,
                PRIMARY KEY ((user_id, group_id), timestamp, event_id)
            ) WITH CLUSTERING ORDER BY (timestamp DESC)"#
        ),
        "mem_cells_by_user",
    )
    .await?;

    // --- AtomicEvent ---
    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.atomic_events_by_id (
                log_id TEXT PRIMARY KEY,
                parent_event_id TEXT,
                payload_json TEXT
            )"#
        ),
        "atomic_events_by_id",
    )
    .await?;

    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.atomic_events_by_parent (
                parent_event_id TEXT,
                log_id TEXT,
                payload_json TEXT,
                PRIMARY KEY ((parent_event_id), log_id)
            )"#
        ),
        "atomic_events_by_parent",
    )
    .await?;

    // --- SemanticMemory ---
    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.semantic_memories_by_id (
                memory_id TEXT PRIMARY KEY,
                parent_event_id TEXT,
                scope_key TEXT,
                payload_json TEXT
            )"#
        ),
        "semantic_memories_by_id",
    )
    .await?;

    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.semantic_memories_by_parent (
                parent_event_id TEXT,
                memory_id TEXT,
                payload_json TEXT,
                PRIMARY KEY ((parent_event_id), memory_id)
            )"#
        ),
        "semantic_memories_by_parent",
    )
    .await?;

    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.semantic_memories_by_scope (
                scope_key TEXT,
                start_time TIMESTAMP,
                memory_id TEXT,
                payload_json TEXT,
                PRIMARY KEY ((scope_key), start_time, memory_id)
            ) WITH CLUSTERING ORDER BY (start_time DESC)"#
        ),
        "semantic_memories_by_scope",
    )
    .await?;

    // --- Profile ---
    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.profiles (
                user_id TEXT,
                group_id TEXT,
                sequence BIGINT,
                version TEXT,
                is_latest BOOLEAN,
                payload_json TEXT,
                created_at TIMESTAMP,
                PRIMARY KEY ((user_id, group_id), sequence)
            ) WITH CLUSTERING ORDER BY (sequence DESC)"#
        ),
        "profiles",
    )
    .await?;

    // --- ClusterState ---
    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.cluster_state (
                group_id TEXT PRIMARY KEY,
                payload_json TEXT
            )"#
        ),
        "cluster_state",
    )
    .await?;

    // --- ConversationMeta / ConversationStatus ---
    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.conversation_meta (
                group_id TEXT PRIMARY KEY,
                scene TEXT,
                default_timezone TEXT,
                created_at TIMESTAMP,
                payload_json TEXT
            )"#
        ),
        "conversation_meta",
    )
    .await?;

    run(
        session,
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.conversation_status (
                group_id TEXT PRIMARY KEY,
                old_msg_start_time TIMESTAMP,
                new_msg_start_time TIMESTAMP,
                last_memcell_time TIMESTAMP
            )"#
        ),
        "conversation_status",
    )
    .await?;

    tracing::info!("all entity tables created successfully");
    Ok(())
}
