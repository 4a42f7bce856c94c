//! Chat-history sink backed by ScyllaDB
//!
//! The agent hands over finished message logs; rows are only ever addressed
//! by session id.

use async_trait::async_trait;

use docqa_core::{ChatHistoryStore, ChatMessage, Error, Result, Role};

use crate::{PersistenceError, ScyllaClient};

/// ScyllaDB-backed [`ChatHistoryStore`].
#[derive(Clone)]
pub struct ScyllaHistoryStore {
    client: ScyllaClient,
}

impl ScyllaHistoryStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

fn role_tag(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[async_trait]
impl ChatHistoryStore for ScyllaHistoryStore {
    async fn append(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
        let query = format!(
            "INSERT INTO {}.chat_history (session_id, appended_at, role, message_json) \
             VALUES (?, now(), ?, ?)",
            self.client.keyspace()
        );

        for message in messages {
            let body = serde_json::to_string(message)
                .map_err(|e| Error::Internal(format!("history encode: {}", e)))?;
            self.client
                .session()
                .query_unpaged(query.clone(), (session_id, role_tag(message.role), body))
                .await
                .map_err(|e| PersistenceError::Query(e.to_string()))?;
        }

        Ok(())
    }
}
