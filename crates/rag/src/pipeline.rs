//! Retrieval pipeline orchestrator
//!
//! One reentrant async procedure per query: cache probe → optional HyDE →
//! parallel dense+sparse retrieval → RRF fusion → optional rerank → answer
//! generation → cache writeback. Soft failures degrade the run and are
//! recorded in the result metadata; only losing both retrieval paths is a
//! hard failure. A cancellation token is honored at every suspension point.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use docqa_cache::{Fingerprint, QueryCache};
use docqa_core::{
    AnswerOutcome, CacheOutcome, ChatMessage, CompletionRequest, EmbeddingService, Error,
    FeatureOutcome, LlmService, PipelineMetadata, PipelineResult, QueryRequest, RankedHit, Result,
    VectorStore,
};

use docqa_config::constants::retrieval::{EXCERPT_CHARS, MIN_CANDIDATES, RRF_K};

use crate::bm25::Bm25Index;
use crate::fusion::reciprocal_rank_fusion;
use crate::hyde::HydeExpander;
use crate::reranker::LlmReranker;

const ANSWER_SYSTEM_PROMPT: &str = "Answer the user's question using only \
the provided context passages. Cite the source name of each passage you \
rely on. If the context contains nothing relevant, say that no relevant \
information was found.";

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum candidates requested from each retrieval path
    pub min_candidates: usize,
    /// Reciprocal rank fusion constant
    pub rrf_k: f32,
    /// Excerpt length (chars) used in the answer prompt
    pub excerpt_chars: usize,
    /// Model override for answer generation
    pub answer_model: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_candidates: MIN_CANDIDATES,
            rrf_k: RRF_K,
            excerpt_chars: EXCERPT_CHARS,
            answer_model: None,
        }
    }
}

/// The hybrid retrieval pipeline.
///
/// All collaborators are shared singletons; the pipeline itself holds no
/// per-query state and may be called concurrently. Concurrent calls with the
/// same fingerprint run independently; the cache writeback is
/// last-writer-wins.
pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingService>,
    vector_store: Arc<dyn VectorStore>,
    bm25: Arc<Bm25Index>,
    llm: Arc<dyn LlmService>,
    cache: Arc<QueryCache>,
    hyde: HydeExpander,
    reranker: LlmReranker,
    config: PipelineConfig,
}

impl RetrievalPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        bm25: Arc<Bm25Index>,
        llm: Arc<dyn LlmService>,
        cache: Arc<QueryCache>,
        hyde: HydeExpander,
        reranker: LlmReranker,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            bm25,
            llm,
            cache,
            hyde,
            reranker,
            config,
        }
    }

    /// Run the full pipeline for one query.
    pub async fn execute(
        &self,
        request: &QueryRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineResult> {
        request.validate()?;

        let mut metadata = PipelineMetadata {
            hybrid: request.use_hybrid,
            ..Default::default()
        };

        // Stage 1: cache probe
        let fingerprint = Fingerprint::compute(request);
        if request.use_cache {
            if let Some(mut cached) = self.cache.get(&fingerprint).await {
                cached.metadata.cache = CacheOutcome::Hit;
                tracing::debug!(key = %fingerprint, "pipeline served from cache");
                return Ok(cached);
            }
            metadata.cache = CacheOutcome::Miss;
        }

        // Stage 2: HyDE expansion. The passage only replaces the text used
        // for dense search; sparse search and the answer prompt keep the
        // original question.
        let dense_query = if request.use_hyde {
            match self.hyde.expand(&request.query, &cancel).await? {
                Some(passage) => {
                    metadata.hyde = FeatureOutcome::Applied;
                    passage
                }
                None => {
                    metadata.hyde = FeatureOutcome::Failed;
                    request.query.clone()
                }
            }
        } else {
            request.query.clone()
        };

        // Stage 3: parallel retrieval
        let fetch_k = request.top_k.max(self.config.min_candidates);
        let dense_future = self.search_dense(&dense_query, fetch_k, &request.sources);
        let sparse_future = async {
            if request.use_hybrid {
                Some(self.bm25.search(&request.query, fetch_k, &request.sources))
            } else {
                None
            }
        };

        let (dense_result, sparse_result) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            results = async { tokio::join!(dense_future, sparse_future) } => results,
        };

        let (dense_hits, sparse_hits) =
            self.settle_retrieval(dense_result, sparse_result, &mut metadata)?;

        // Stage 4: fusion (or single-path passthrough)
        let mut hits = match (dense_hits, sparse_hits) {
            (Some(dense), Some(sparse)) => {
                reciprocal_rank_fusion(&dense, &sparse, self.config.rrf_k)
            }
            (Some(single), None) | (None, Some(single)) => single,
            (None, None) => Vec::new(),
        };
        hits.truncate(request.top_k);

        // Stage 5: rerank
        if request.use_reranker && !hits.is_empty() {
            match self.reranker.score(&request.query, &hits, &cancel).await {
                Ok(scores) if scores.len() == hits.len() => {
                    for (hit, score) in hits.iter_mut().zip(&scores) {
                        hit.rerank_score = Some(*score);
                        hit.final_score = *score;
                    }
                    hits.sort_by(|a, b| {
                        b.final_score
                            .partial_cmp(&a.final_score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
                    });
                    hits.truncate(request.effective_rerank_top_k());
                    metadata.rerank = FeatureOutcome::Applied;
                }
                Ok(_) => {
                    tracing::warn!("reranker returned a mismatched score count, keeping fused order");
                    metadata.rerank = FeatureOutcome::Failed;
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    tracing::warn!(error = %e, "rerank failed, keeping fused order");
                    metadata.rerank = FeatureOutcome::Failed;
                }
            }
        }

        // Stage 6: answer generation
        let answer = match self.generate_answer(&request.query, &hits, &cancel).await {
            Ok(answer) => answer,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "answer generation failed, returning hits only");
                metadata.answer = AnswerOutcome::Failed;
                String::new()
            }
        };

        let result = PipelineResult {
            answer,
            hits,
            metadata,
        };

        // Stage 7: cache writeback, last-writer-wins. Deliberately not under
        // the cancellation token: a write already in flight completes.
        if request.use_cache {
            self.cache.put(&fingerprint, result.clone()).await;
        }

        Ok(result)
    }

    /// Dense path: embed the (possibly HyDE-expanded) query and search the
    /// vector store. Similarities are monotonically normalized into [0,1].
    async fn search_dense(
        &self,
        query: &str,
        fetch_k: usize,
        sources: &[String],
    ) -> Result<Vec<RankedHit>> {
        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingFailed("empty embedding batch".into()))?;

        let scored = self
            .vector_store
            .search(&vector, fetch_k, sources, None)
            .await?;

        Ok(scored
            .into_iter()
            .map(|chunk| {
                let normalized = normalize_similarity(chunk.score);
                RankedHit {
                    chunk_id: chunk.chunk_id,
                    source: chunk.source,
                    text: chunk.text,
                    dense_score: Some(normalized),
                    sparse_score: None,
                    fused_score: None,
                    rerank_score: None,
                    final_score: normalized,
                }
            })
            .collect())
    }

    /// Resolve the two path results into usable hit lists, degrading to a
    /// single path when the other errored and failing hard only when no path
    /// survived.
    fn settle_retrieval(
        &self,
        dense: Result<Vec<RankedHit>>,
        sparse: Option<Result<Vec<RankedHit>>>,
        metadata: &mut PipelineMetadata,
    ) -> Result<(Option<Vec<RankedHit>>, Option<Vec<RankedHit>>)> {
        match (dense, sparse) {
            // Hybrid, both paths answered
            (Ok(dense), Some(Ok(sparse))) => Ok((Some(dense), Some(sparse))),
            // Hybrid, one path down
            (Ok(dense), Some(Err(e))) => {
                tracing::warn!(error = %e, "sparse path failed, dense-only results");
                metadata.degraded_paths.push("sparse".to_string());
                Ok((Some(dense), None))
            }
            (Err(e), Some(Ok(sparse))) => {
                tracing::warn!(error = %e, "dense path failed, sparse-only results");
                metadata.degraded_paths.push("dense".to_string());
                Ok((None, Some(sparse)))
            }
            // Hybrid, both paths dead
            (Err(dense_err), Some(Err(sparse_err))) => Err(Error::RetrievalUnavailable(format!(
                "dense: {}; sparse: {}",
                dense_err, sparse_err
            ))),
            // Dense only: its error is the pipeline's error
            (Ok(dense), None) => Ok((Some(dense), None)),
            (Err(e), None) => Err(e),
        }
    }

    /// Build the answer prompt from the question and the surviving hits.
    async fn generate_answer(
        &self,
        question: &str,
        hits: &[RankedHit],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut context = String::new();
        if hits.is_empty() {
            context.push_str("(no context passages were found)\n");
        }
        for hit in hits {
            context.push_str(&format!(
                "[{}]\n{}\n\n",
                hit.source,
                hit.excerpt(self.config.excerpt_chars)
            ));
        }

        let mut request = CompletionRequest::new(vec![
            ChatMessage::system(ANSWER_SYSTEM_PROMPT),
            ChatMessage::user(format!("Context:\n{}\nQuestion: {}", context, question)),
        ]);
        if let Some(ref model) = self.config.answer_model {
            request = request.with_model(model.clone());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.llm.complete(request) => result,
        }
    }
}

/// Monotone map from the store's native similarity (cosine / inner product
/// in [-1,1]) into [0,1].
pub fn normalize_similarity(score: f32) -> f32 {
    ((score + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_similarity_monotone() {
        assert!(normalize_similarity(0.9) > normalize_similarity(0.1));
        assert!(normalize_similarity(-1.0) >= 0.0);
        assert!(normalize_similarity(1.0) <= 1.0);
        assert_eq!(normalize_similarity(1.0), 1.0);
    }
}
