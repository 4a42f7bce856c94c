//! Knowledge-search tool
//!
//! Exposes the retrieval pipeline to the LLM. The tool result text carries
//! the generated answer and the evidence list; the structured payload mirrors
//! the RPC response shape so event consumers can render sources.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use docqa_core::{QueryRequest, ToolDefinition};
use docqa_rag::RetrievalPipeline;

use docqa_config::constants::retrieval::EXCERPT_CHARS;

use crate::tool::{Tool, ToolError, ToolOutput};

pub const KNOWLEDGE_TOOL_NAME: &str = "search_knowledge";

#[derive(Debug, Deserialize)]
struct KnowledgeArgs {
    query: String,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Retrieval pipeline as an agent tool.
pub struct KnowledgeSearchTool {
    pipeline: Arc<RetrievalPipeline>,
    default_top_k: usize,
}

impl KnowledgeSearchTool {
    pub fn new(pipeline: Arc<RetrievalPipeline>, default_top_k: usize) -> Self {
        Self {
            pipeline,
            default_top_k,
        }
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        KNOWLEDGE_TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: KNOWLEDGE_TOOL_NAME.into(),
            description: "Search the knowledge base and return an answer \
                          grounded in the most relevant passages."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural-language question to search for"
                    },
                    "sources": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Restrict the search to these source documents"
                    },
                    "top_k": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of passages to return"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        let args: KnowledgeArgs = serde_json::from_value(arguments.clone())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".into()));
        }
        Ok(())
    }

    async fn execute(
        &self,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let args: KnowledgeArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let request = QueryRequest::new(args.query)
            .with_sources(args.sources)
            .with_top_k(args.top_k.unwrap_or(self.default_top_k));

        let result = self.pipeline.execute(&request, cancel).await?;

        let mut text = result.answer.clone();
        if !result.hits.is_empty() {
            text.push_str("\n\nSources:\n");
            for hit in &result.hits {
                text.push_str(&format!(
                    "- {} (score {:.2}): {}\n",
                    hit.source,
                    hit.final_score,
                    hit.excerpt(EXCERPT_CHARS)
                ));
            }
        }

        let data = serde_json::json!({
            "answer": result.answer,
            "sources": result.source_refs(EXCERPT_CHARS),
            "metadata": result.metadata,
        });

        Ok(ToolOutput::text(text).with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition_only() -> ToolDefinition {
        // The definition is static; no pipeline needed to check the schema
        ToolDefinition {
            name: KNOWLEDGE_TOOL_NAME.into(),
            description: String::new(),
            parameters: serde_json::json!({}),
        }
    }

    #[test]
    fn test_tool_name_stable() {
        assert_eq!(definition_only().name, "search_knowledge");
    }

    #[test]
    fn test_args_parse_with_defaults() {
        let args: KnowledgeArgs =
            serde_json::from_value(serde_json::json!({"query": "what is x"})).unwrap();
        assert!(args.sources.is_empty());
        assert!(args.top_k.is_none());
    }

    #[test]
    fn test_args_reject_missing_query() {
        let parsed: Result<KnowledgeArgs, _> =
            serde_json::from_value(serde_json::json!({"top_k": 3}));
        assert!(parsed.is_err());
    }
}
