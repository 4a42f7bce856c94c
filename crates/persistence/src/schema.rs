//! ScyllaDB schema creation

use scylla::Session;

use crate::PersistenceError;

/// Create the keyspace if it doesn't exist
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
        .map_err(|e| PersistenceError::Schema(format!("failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // Shared query-cache tier. Per-entry TTL is applied on write; the
    // table default is a backstop.
    let cache_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.cache_entries (
            key TEXT,
            value BLOB,
            created_at TIMESTAMP,
            PRIMARY KEY (key)
        ) WITH default_time_to_live = 86400
    "#,
        keyspace
    );

    session
        .query_unpaged(cache_table, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create cache table: {}", e)))?;

    // Finished message logs, clustered per session in append order
    let history_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.chat_history (
            session_id TEXT,
            appended_at TIMEUUID,
            role TEXT,
            message_json TEXT,
            PRIMARY KEY ((session_id), appended_at)
        ) WITH CLUSTERING ORDER BY (appended_at ASC)
    "#,
        keyspace
    );

    session
        .query_unpaged(history_table, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create history table: {}", e)))?;

    Ok(())
}
