//! Pipeline results and feature metadata

use serde::{Deserialize, Serialize};

use crate::chunk::RankedHit;

/// Outcome of the cache probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Caching disabled for this request
    #[default]
    Disabled,
    Hit,
    Miss,
}

/// Outcome of an optional stage (HyDE, rerank)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureOutcome {
    /// Stage not requested
    #[default]
    Off,
    Applied,
    /// Stage errored and degraded silently
    Failed,
}

/// Outcome of the answer stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    #[default]
    Generated,
    Failed,
}

/// Which features fired and which paths degraded during one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub cache: CacheOutcome,
    pub hybrid: bool,
    pub hyde: FeatureOutcome,
    pub rerank: FeatureOutcome,
    pub answer: AnswerOutcome,
    /// Retrieval paths that errored while the other carried the run
    /// ("dense" / "sparse")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_paths: Vec<String>,
}

/// Full output of one pipeline run: the generated answer plus the ranked
/// evidence behind it. This is also the cache payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub answer: String,
    pub hits: Vec<RankedHit>,
    pub metadata: PipelineMetadata,
}

impl PipelineResult {
    /// Project the hits into the upstream RPC response shape.
    pub fn source_refs(&self, excerpt_chars: usize) -> Vec<SourceRef> {
        self.hits
            .iter()
            .map(|h| SourceRef {
                name: h.source.clone(),
                score: h.final_score,
                excerpt: h.excerpt(excerpt_chars),
                dense_score: h.dense_score,
                sparse_score: h.sparse_score,
            })
            .collect()
    }
}

/// One evidence entry of the RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub name: String,
    pub score: f32,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_score: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_roundtrips_through_json() {
        let result = PipelineResult {
            answer: "X is Y".into(),
            hits: vec![RankedHit {
                chunk_id: "c1".into(),
                source: "a".into(),
                text: "X is Y because...".into(),
                dense_score: Some(0.9),
                sparse_score: None,
                fused_score: None,
                rerank_score: None,
                final_score: 0.9,
            }],
            metadata: PipelineMetadata {
                cache: CacheOutcome::Miss,
                hybrid: true,
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: PipelineResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.answer, "X is Y");
        assert_eq!(back.hits.len(), 1);
        assert_eq!(back.metadata.cache, CacheOutcome::Miss);
        assert_eq!(back.hits[0].sparse_score, None);
    }
}
