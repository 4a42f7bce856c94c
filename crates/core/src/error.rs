//! Error types shared across the workspace
//!
//! One behavior-oriented taxonomy: soft errors degrade a pipeline run and are
//! recorded in its metadata, hard errors surface to the caller as a single
//! structured error. Retries never happen at this level; they belong to the
//! collaborator clients.

use thiserror::Error;

/// Workspace-wide error type
#[derive(Error, Debug)]
pub enum Error {
    /// Chunk, source, or session absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request rejected before the pipeline runs
    #[error("validation: {0}")]
    Validation(String),

    /// Shared cache tier unreachable; local tier still serves
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Embedding service error
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Vector store search or scan error
    #[error("vector store failed: {0}")]
    VectorStoreFailed(String),

    /// Keyword index not initialized or degraded
    #[error("bm25 unavailable: {0}")]
    Bm25Unavailable(String),

    /// LLM completion error
    #[error("llm failed: {0}")]
    LlmFailed(String),

    /// Both retrieval paths failed; nothing to rank
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// User-initiated cancellation; terminal, no retry
    #[error("cancelled")]
    Cancelled,

    /// Invariant violation
    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    /// Stable lowercase kind tag, used in structured error payloads and
    /// synthetic tool results.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation",
            Error::CacheUnavailable(_) => "cache_unavailable",
            Error::EmbeddingFailed(_) => "embedding_failed",
            Error::VectorStoreFailed(_) => "vector_store_failed",
            Error::Bm25Unavailable(_) => "bm25_unavailable",
            Error::LlmFailed(_) => "llm_failed",
            Error::RetrievalUnavailable(_) => "retrieval_unavailable",
            Error::Cancelled => "cancelled",
            Error::Internal(_) => "internal",
        }
    }
}

/// Workspace-wide result alias
pub type Result<T> = std::result::Result<T, Error>;
