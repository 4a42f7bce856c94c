//! Durable cache tier backed by ScyllaDB

use std::time::Duration;

use async_trait::async_trait;
use scylla::frame::value::CqlTimestamp;

use docqa_core::{KvStore, Result};

use crate::{PersistenceError, ScyllaClient};

/// ScyllaDB-backed [`KvStore`] for the shared cache tier.
///
/// TTL is enforced by the store via `USING TTL`; a zero TTL is written as
/// one second so the row still expires (CQL treats TTL 0 as "never").
#[derive(Clone)]
pub struct ScyllaKvStore {
    client: ScyllaClient,
}

impl ScyllaKvStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KvStore for ScyllaKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let query = format!(
            "SELECT value FROM {}.cache_entries WHERE key = ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (key,))
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        let row = result
            .maybe_first_row_typed::<(Vec<u8>,)>()
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let ttl_secs = ttl.as_secs().max(1);
        let query = format!(
            "INSERT INTO {}.cache_entries (key, value, created_at) VALUES (?, ?, ?) USING TTL {}",
            self.client.keyspace(),
            ttl_secs
        );

        let now = CqlTimestamp(chrono::Utc::now().timestamp_millis());
        self.client
            .session()
            .query_unpaged(query, (key, value, now))
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        Ok(())
    }
}
