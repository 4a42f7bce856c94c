//! Cross-encoder reranking
//!
//! One LLM call scores every (query, passage) pair in [0,1], one
//! `INDEX: SCORE` line per candidate. Parsing is forgiving: lines that don't
//! parse leave their candidate at 0. When the LLM is unavailable the stage
//! falls back to a deterministic lexical-overlap score, so reranking never
//! becomes a hard failure.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use docqa_core::{ChatMessage, CompletionRequest, Error, LlmService, RankedHit, Result};

use crate::bm25::tokenize;

static SCORE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(\d+)\s*[:.\)\-]\s*([0-9]*\.?[0-9]+)").expect("score regex"));

/// Reranker configuration
#[derive(Debug, Clone, Default)]
pub struct RerankerConfig {
    /// Model override for the scoring call
    pub model: Option<String>,
    /// Passage excerpt length (chars) shown to the scorer
    pub excerpt_chars: usize,
}

impl RerankerConfig {
    fn excerpt_chars(&self) -> usize {
        if self.excerpt_chars == 0 {
            400
        } else {
            self.excerpt_chars
        }
    }
}

/// LLM reranker with a lexical fallback.
pub struct LlmReranker {
    llm: Arc<dyn LlmService>,
    config: RerankerConfig,
}

impl LlmReranker {
    pub fn new(llm: Arc<dyn LlmService>, config: RerankerConfig) -> Self {
        Self { llm, config }
    }

    /// Score each hit's relevance to the query, in hit order. Scores are in
    /// [0,1]; candidates whose line is missing or unparseable score 0.
    pub async fn score(
        &self,
        query: &str,
        hits: &[RankedHit],
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let request = self.build_request(query, hits);
        let completion = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.llm.complete(request) => result,
        };

        match completion {
            Ok(text) => Ok(parse_scores(&text, hits.len())),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "llm reranker unavailable, using lexical overlap");
                Ok(hits
                    .iter()
                    .map(|hit| lexical_overlap(query, &hit.text))
                    .collect())
            }
        }
    }

    fn build_request(&self, query: &str, hits: &[RankedHit]) -> CompletionRequest {
        let mut prompt = format!(
            "Rate how relevant each passage is to the question on a scale \
             from 0.0 (irrelevant) to 1.0 (directly answers it).\n\n\
             Question: {}\n\n",
            query
        );
        for (index, hit) in hits.iter().enumerate() {
            prompt.push_str(&format!(
                "Passage {}:\n{}\n\n",
                index,
                hit.excerpt(self.config.excerpt_chars())
            ));
        }
        prompt.push_str(
            "Respond with one line per passage, format `INDEX: SCORE`, \
             nothing else.",
        );

        let mut request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(0.0);
        if let Some(ref model) = self.config.model {
            request = request.with_model(model.clone());
        }
        request
    }
}

/// Pull `INDEX: SCORE` lines out of the model's reply. Out-of-range indices
/// are ignored; scores clamp into [0,1]; missing candidates stay at 0.
fn parse_scores(text: &str, count: usize) -> Vec<f32> {
    let mut scores = vec![0.0f32; count];
    for capture in SCORE_LINE.captures_iter(text) {
        let Ok(index) = capture[1].parse::<usize>() else {
            continue;
        };
        let Ok(score) = capture[2].parse::<f32>() else {
            continue;
        };
        if index < count {
            scores[index] = score.clamp(0.0, 1.0);
        }
    }
    scores
}

/// Deterministic fallback score: the fraction of unique query tokens that
/// appear in the passage.
pub fn lexical_overlap(query: &str, passage: &str) -> f32 {
    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let passage_tokens: HashSet<String> = tokenize(passage).into_iter().collect();
    let present = query_tokens
        .iter()
        .filter(|t| passage_tokens.contains(*t))
        .count();
    present as f32 / query_tokens.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    use docqa_core::StreamEvent;

    fn hit(id: &str, text: &str) -> RankedHit {
        RankedHit {
            chunk_id: id.into(),
            source: "doc".into(),
            text: text.into(),
            dense_score: None,
            sparse_score: None,
            fused_score: None,
            rerank_score: None,
            final_score: 0.0,
        }
    }

    #[test]
    fn test_parse_well_formed_lines() {
        let scores = parse_scores("0: 0.9\n1: 0.2\n2: 1.0", 3);
        assert_eq!(scores, vec![0.9, 0.2, 1.0]);
    }

    #[test]
    fn test_parse_tolerates_noise_and_missing_lines() {
        let text = "Here are the scores:\n0 - 0.75\nskipping one\n2) .5\n";
        let scores = parse_scores(text, 3);
        assert_eq!(scores, vec![0.75, 0.0, 0.5]);
    }

    #[test]
    fn test_parse_clamps_and_ignores_out_of_range() {
        let scores = parse_scores("0: 7.5\n9: 0.4", 2);
        assert_eq!(scores, vec![1.0, 0.0]);
    }

    #[test]
    fn test_lexical_overlap() {
        let score = lexical_overlap("gold loan rate", "the rate for a gold loan is ten percent");
        assert!((score - 1.0).abs() < 1e-6);
        let partial = lexical_overlap("gold loan rate", "loans are great");
        assert!(partial < 0.5);
        assert_eq!(lexical_overlap("", "anything"), 0.0);
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmService for FailingLlm {
        async fn complete(&self, _request: CompletionRequest) -> Result<String> {
            Err(Error::LlmFailed("down".into()))
        }

        async fn stream_complete(
            &self,
            _request: CompletionRequest,
            _cancel: CancellationToken,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            Err(Error::LlmFailed("down".into()))
        }
    }

    #[tokio::test]
    async fn test_fallback_on_llm_failure() {
        let reranker = LlmReranker::new(Arc::new(FailingLlm), RerankerConfig::default());
        let hits = vec![
            hit("c1", "gold loan rates explained"),
            hit("c2", "unrelated passage"),
        ];
        let scores = reranker
            .score("gold loan rates", &hits, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(scores.len(), 2);
        // Lexical fallback still separates the relevant passage
        assert!(scores[0] > scores[1]);
    }

    #[tokio::test]
    async fn test_empty_candidates_short_circuit() {
        let reranker = LlmReranker::new(Arc::new(FailingLlm), RerankerConfig::default());
        let scores = reranker
            .score("query", &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(scores.is_empty());
    }
}
