//! LLM and embedding clients
//!
//! HTTP clients for the two remote model services the core depends on:
//! - An OpenAI-compatible chat API (non-streaming and SSE streaming, with
//!   tool schema advertisement and mid-stream tool calls)
//! - An embedding API (batched)
//!
//! Both clients are process-wide singletons with internal connection pools;
//! create once at startup and share by `Arc`. Bounded retry with jittered
//! exponential backoff lives here, never in the core.

pub mod client;
pub mod embeddings;

pub use client::{HttpLlmClient, LlmClientConfig};
pub use embeddings::{EmbeddingClientConfig, HttpEmbeddingClient};

use thiserror::Error;

/// LLM client errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timeout")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for docqa_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Cancelled => docqa_core::Error::Cancelled,
            other => docqa_core::Error::LlmFailed(other.to_string()),
        }
    }
}

/// Whether a request is worth retrying (transient transport failures and
/// server-side errors only).
pub(crate) fn is_retryable(error: &LlmError) -> bool {
    matches!(error, LlmError::Network(_) | LlmError::Timeout)
}
