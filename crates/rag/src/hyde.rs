//! HyDE query expansion
//!
//! Asks the LLM to draft a hypothetical passage that would answer the
//! question; the passage's embedding stands in for the question's during
//! dense search. The original question still drives sparse search and the
//! answer prompt. Any failure here degrades silently to the original
//! question.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use docqa_core::{ChatMessage, CompletionRequest, Error, LlmService, Result};

const HYDE_SYSTEM_PROMPT: &str = "Write a short factual passage that would \
answer the user's question. Respond with the passage only, no preamble. If \
you are unsure of the facts, write the most plausible passage anyway.";

/// Hypothetical-document expander.
pub struct HydeExpander {
    llm: Arc<dyn LlmService>,
}

impl HydeExpander {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }

    /// Draft the hypothetical passage. Returns `None` when the LLM fails so
    /// the caller can fall back to the original question; cancellation
    /// propagates as an error.
    pub async fn expand(&self, question: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(HYDE_SYSTEM_PROMPT),
            ChatMessage::user(question),
        ]);

        let completion = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.llm.complete(request) => result,
        };

        match completion {
            Ok(passage) if !passage.trim().is_empty() => Ok(Some(passage)),
            Ok(_) => {
                tracing::warn!("hyde returned an empty passage, using original question");
                Ok(None)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "hyde expansion failed, using original question");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    use docqa_core::StreamEvent;

    struct FixedLlm {
        response: Result<String>,
    }

    #[async_trait]
    impl LlmService for FixedLlm {
        async fn complete(&self, _request: CompletionRequest) -> Result<String> {
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(Error::LlmFailed(msg)) => Err(Error::LlmFailed(msg.clone())),
                Err(_) => Err(Error::Internal("unexpected".into())),
            }
        }

        async fn stream_complete(
            &self,
            _request: CompletionRequest,
            _cancel: CancellationToken,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            Err(Error::Internal("not used".into()))
        }
    }

    #[tokio::test]
    async fn test_expansion_returns_passage() {
        let expander = HydeExpander::new(Arc::new(FixedLlm {
            response: Ok("Gold loans are secured loans backed by gold.".into()),
        }));
        let passage = expander
            .expand("what is a gold loan", &CancellationToken::new())
            .await
            .unwrap();
        assert!(passage.unwrap().contains("secured"));
    }

    #[tokio::test]
    async fn test_llm_failure_degrades_to_none() {
        let expander = HydeExpander::new(Arc::new(FixedLlm {
            response: Err(Error::LlmFailed("connection refused".into())),
        }));
        let passage = expander
            .expand("what is a gold loan", &CancellationToken::new())
            .await
            .unwrap();
        assert!(passage.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let expander = HydeExpander::new(Arc::new(FixedLlm {
            response: Ok("irrelevant".into()),
        }));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = expander.expand("question", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
