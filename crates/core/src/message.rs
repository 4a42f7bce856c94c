//! Chat message types for the agent loop

use serde::{Deserialize, Serialize};

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of a session's append-only message log.
///
/// Assistant messages may carry tool calls; tool messages carry the result of
/// exactly one call, linked by `tool_call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant message carrying a tool call and any text emitted before it
    pub fn assistant_tool_call(content: impl Into<String>, call: ToolCallRequest) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: vec![call],
            tool_call_id: None,
        }
    }

    /// Tool result message for the call with the given id
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool invocation the LLM asked for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call id, echoed back in the result message
    pub id: String,
    /// Registered tool name
    pub name: String,
    /// JSON arguments as emitted by the model
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// Tool schema advertised to the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: serde_json::Value,
}

/// One item of an LLM token stream: a text fragment or a mid-stream tool
/// call. The stream ending is the end-of-generation sentinel.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token(String),
    ToolCall(ToolCallRequest),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_links_call_id() {
        let call = ToolCallRequest::new("search_knowledge", serde_json::json!({"query": "x"}));
        let result = ChatMessage::tool_result(call.id.clone(), "found it");
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some(call.id.as_str()));
    }

    #[test]
    fn test_message_serde_skips_empty_fields() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
    }
}
