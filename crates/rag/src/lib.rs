//! Retrieval pipeline with hybrid search
//!
//! Features:
//! - Dense vector search via Qdrant
//! - In-process BM25 keyword index with watermark refresh
//! - Hybrid fusion with RRF
//! - LLM cross-encoder reranking with lexical-overlap fallback
//! - HyDE query expansion
//! - Two-tier result caching
//! - Soft degradation when one retrieval path fails

pub mod bm25;
pub mod fusion;
pub mod hyde;
pub mod pipeline;
pub mod qdrant_store;
pub mod reranker;

pub use bm25::{tokenize, Bm25Config, Bm25Index};
pub use fusion::reciprocal_rank_fusion;
pub use hyde::HydeExpander;
pub use pipeline::{PipelineConfig, RetrievalPipeline};
pub use qdrant_store::{QdrantStoreConfig, QdrantVectorStore};
pub use reranker::{lexical_overlap, LlmReranker, RerankerConfig};

use thiserror::Error;

/// Retrieval errors local to this crate; they convert into the
/// workspace-wide taxonomy at the pipeline boundary.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl From<RagError> for docqa_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Index(msg) | RagError::Search(msg) => docqa_core::Error::Bm25Unavailable(msg),
            RagError::VectorStore(msg) | RagError::Connection(msg) => {
                docqa_core::Error::VectorStoreFailed(msg)
            }
        }
    }
}
