//! Collaborator contracts
//!
//! The core treats the embedding model, the LLM, the vector database, the
//! shared cache tier, and chat-history storage as remote services behind
//! these narrow traits. Any conforming implementation works; tests substitute
//! in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::chunk::{Chunk, ScoredChunk};
use crate::error::Result;
use crate::message::{ChatMessage, StreamEvent, ToolDefinition};

/// Maximum batch size an embedding implementation must accept.
pub const EMBEDDING_MAX_BATCH: usize = 64;

/// Dense embedding service.
///
/// Batches are non-empty and at most [`EMBEDDING_MAX_BATCH`] texts. The
/// output dimension is fixed per deployment.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embedding dimension D for this deployment
    fn dimension(&self) -> usize;
}

/// Vector database holding the chunk collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Nearest-neighbor search. `sources` filters by origin document (empty
    /// means all); `min_score` cuts on the store's native similarity.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        sources: &[String],
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Stream the chunk set for keyword-index (re)builds. With a watermark,
    /// only chunks with `seq` greater than it are yielded.
    async fn list_chunks(&self, since: Option<u64>) -> Result<BoxStream<'static, Result<Chunk>>>;

    /// Drop every chunk of one source document.
    async fn delete_by_source(&self, source: &str) -> Result<()>;
}

/// Request for one LLM completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Tool schemas to advertise; empty disables tool calling
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Model override (the client's configured model otherwise)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Chat LLM behind an HTTP API.
///
/// Implementations are process-wide singletons and must support concurrent
/// use from many callers. Cancelling the token passed to `stream_complete`
/// must release the underlying connection promptly.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Non-streaming completion; returns the assistant text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Streaming completion. Tokens and mid-stream tool calls arrive in
    /// model-emitted order; the stream ends after the final event.
    async fn stream_complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;
}

/// Durable key-value store backing the shared cache tier. Failures are soft;
/// callers degrade to the local tier.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value with the given time-to-live, enforced by the store.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
}

/// Sink for finished message logs. The core only ever addresses history by
/// session id, never by content.
#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    async fn append(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()>;
}
