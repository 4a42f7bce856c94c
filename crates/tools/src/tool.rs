//! Tool interface

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use docqa_core::ToolDefinition;

use docqa_config::constants::timeouts::TOOL_DEFAULT_MS;

/// Tool execution errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool {tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("cancelled")]
    Cancelled,
}

impl ToolError {
    /// Stable kind tag for synthetic tool-result messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "not_found",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::Timeout { .. } => "timeout",
            ToolError::Execution(_) => "execution_failed",
            ToolError::Cancelled => "cancelled",
        }
    }
}

impl From<docqa_core::Error> for ToolError {
    fn from(err: docqa_core::Error) -> Self {
        match err {
            docqa_core::Error::Cancelled => ToolError::Cancelled,
            docqa_core::Error::Validation(msg) => ToolError::InvalidArguments(msg),
            other => ToolError::Execution(other.to_string()),
        }
    }
}

/// Result of one tool execution, fed back to the LLM as a tool message.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Text the model sees
    pub text: String,
    /// Structured payload for event consumers
    pub data: Option<Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A tool the agent can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registered name, matching the advertised schema
    fn name(&self) -> &str;

    /// Schema advertised to the LLM
    fn definition(&self) -> ToolDefinition;

    /// Execution budget; the registry enforces it
    fn timeout_secs(&self) -> u64 {
        TOOL_DEFAULT_MS / 1000
    }

    /// Cheap argument check before execution
    fn validate(&self, _arguments: &Value) -> Result<(), ToolError> {
        Ok(())
    }

    /// Run the tool. Cancellation must be honored at suspension points.
    async fn execute(
        &self,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolError>;
}
