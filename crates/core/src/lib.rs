//! Core types and traits for the docqa retrieval service
//!
//! This crate provides foundational types used across all other crates:
//! - Chunk and ranked-hit types (the atoms of retrieval)
//! - Query requests with validation
//! - Pipeline results and feature metadata
//! - Chat message types for the agent loop
//! - Collaborator traits for pluggable backends (embedding, vector store,
//!   LLM, durable KV, chat history)
//! - Error types

pub mod chunk;
pub mod error;
pub mod message;
pub mod query;
pub mod result;
pub mod traits;

pub use chunk::{Chunk, RankedHit, ScoredChunk};
pub use error::{Error, Result};
pub use message::{ChatMessage, Role, StreamEvent, ToolCallRequest, ToolDefinition};
pub use query::QueryRequest;
pub use result::{
    AnswerOutcome, CacheOutcome, FeatureOutcome, PipelineMetadata, PipelineResult, SourceRef,
};
pub use traits::{
    ChatHistoryStore, CompletionRequest, EmbeddingService, KvStore, LlmService, VectorStore,
    EMBEDDING_MAX_BATCH,
};
