//! ScyllaDB persistence layer
//!
//! Provides the durable collaborators behind the core's narrow contracts:
//! - The shared query-cache tier ([`docqa_core::KvStore`])
//! - The chat-history sink ([`docqa_core::ChatHistoryStore`])
//!
//! Both are soft dependencies: the cache degrades to its local tier and the
//! agent logs a warning when the store is unreachable.

pub mod cache_store;
pub mod client;
pub mod history;
pub mod schema;

pub use cache_store::ScyllaKvStore;
pub use client::{ScyllaClient, ScyllaConfig};
pub use history::ScyllaHistoryStore;

use thiserror::Error;

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("query error: {0}")]
    Query(String),
}

impl From<PersistenceError> for docqa_core::Error {
    fn from(err: PersistenceError) -> Self {
        docqa_core::Error::CacheUnavailable(err.to_string())
    }
}

/// Connect, ensure the schema, and hand back both stores.
pub async fn init(
    config: ScyllaConfig,
) -> Result<(ScyllaKvStore, ScyllaHistoryStore), PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;
    Ok((
        ScyllaKvStore::new(client.clone()),
        ScyllaHistoryStore::new(client),
    ))
}
