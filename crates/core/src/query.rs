//! Query requests and validation

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_top_k() -> usize {
    5
}

fn default_true() -> bool {
    true
}

/// A retrieval query: free-form text, a source filter, a result budget, and
/// the feature toggles that shape the pipeline run.
///
/// This is also the JSON shape of the upstream query RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Question text
    pub query: String,
    /// Allowed source names; empty means all sources
    #[serde(default)]
    pub sources: Vec<String>,
    /// Maximum hits to return
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Consult and write the query cache
    #[serde(default = "default_true")]
    pub use_cache: bool,
    /// Combine dense and sparse retrieval; dense only when false
    #[serde(default = "default_true")]
    pub use_hybrid: bool,
    /// Apply the cross-encoder rerank stage
    #[serde(default = "default_true")]
    pub use_reranker: bool,
    /// Expand the query through a hypothetical-document step
    #[serde(default)]
    pub use_hyde: bool,
    /// Size of the post-rerank cut; defaults to `top_k`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_top_k: Option<usize>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sources: Vec::new(),
            top_k: default_top_k(),
            use_cache: true,
            use_hybrid: true,
            use_reranker: true,
            use_hyde: false,
            rerank_top_k: None,
        }
    }

    /// Restrict to the given sources
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Set the result budget
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the post-rerank cut
    pub fn with_rerank_top_k(mut self, rerank_top_k: usize) -> Self {
        self.rerank_top_k = Some(rerank_top_k);
        self
    }

    /// Effective post-rerank cut (never exceeds `top_k`)
    pub fn effective_rerank_top_k(&self) -> usize {
        self.rerank_top_k.unwrap_or(self.top_k).min(self.top_k)
    }

    /// Reject malformed requests before the pipeline runs.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }
        if self.top_k == 0 {
            return Err(Error::Validation("top_k must be at least 1".into()));
        }
        if let Some(rk) = self.rerank_top_k {
            if rk == 0 {
                return Err(Error::Validation("rerank_top_k must be at least 1".into()));
            }
            if rk > self.top_k {
                return Err(Error::Validation(format!(
                    "rerank_top_k {} exceeds top_k {}",
                    rk, self.top_k
                )));
            }
        }
        Ok(())
    }
}
