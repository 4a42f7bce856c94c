//! Document chunks and ranked hits

use serde::{Deserialize, Serialize};

/// Immutable unit the retrieval pipeline deals in.
///
/// A chunk is a bounded slice of one source document's text together with its
/// dense embedding. `seq` is a monotonic ingestion counter; the keyword index
/// uses it as a refresh watermark. Two chunks with equal `id` are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque identifier, stable across reads
    pub id: String,
    /// Origin document name (the granularity for filtering and deletion)
    pub source: String,
    /// Body text (UTF-8)
    pub text: String,
    /// Dense embedding, fixed dimension per deployment
    pub embedding: Vec<f32>,
    /// Monotonic ingestion sequence number
    pub seq: u64,
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Chunk {}

/// Raw hit from the vector store: chunk payload plus the store's native
/// similarity score. The pipeline normalizes the score into [0,1].
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub source: String,
    pub text: String,
    pub score: f32,
}

/// A chunk paired with the scores it accumulated through the pipeline.
///
/// Absent scores never participate in ordering; `final_score` is the one the
/// result list is ordered by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedHit {
    pub chunk_id: String,
    pub source: String,
    pub text: String,
    /// Normalized dense similarity in [0,1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f32>,
    /// BM25 score, unbounded non-negative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_score: Option<f32>,
    /// Reciprocal-rank-fusion score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused_score: Option<f32>,
    /// Cross-encoder relevance in [0,1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    /// Score the final ordering uses
    pub final_score: f32,
}

impl RankedHit {
    /// Excerpt of the chunk body, truncated at a char boundary.
    pub fn excerpt(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            return self.text.clone();
        }
        let cut: String = self.text.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_equality_by_id() {
        let a = Chunk {
            id: "c1".into(),
            source: "doc".into(),
            text: "alpha".into(),
            embedding: vec![0.1],
            seq: 1,
        };
        let b = Chunk {
            id: "c1".into(),
            source: "other".into(),
            text: "beta".into(),
            embedding: vec![0.9],
            seq: 2,
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let hit = RankedHit {
            chunk_id: "c1".into(),
            source: "doc".into(),
            text: "héllo wörld".into(),
            dense_score: None,
            sparse_score: None,
            fused_score: None,
            rerank_score: None,
            final_score: 0.5,
        };
        let excerpt = hit.excerpt(5);
        assert!(excerpt.starts_with("héllo"));
        assert!(excerpt.ends_with("..."));
    }
}
