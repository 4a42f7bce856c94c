//! Session event stream
//!
//! Every event carries a structured payload; the serde tags match the
//! upstream streaming channel (`token`, `tool_start`, `stopped`, ...).
//! Token order equals LLM-emitted order, and the channel closes exactly once
//! per turn; closure is the end-of-stream sentinel.

use serde::Serialize;
use serde_json::Value;

use docqa_core::ChatMessage;

/// One event of a turn's output stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// One streamed completion token
    Token { text: String },
    /// A tool execution began
    ToolStart {
        id: String,
        name: String,
        arguments: Value,
    },
    /// A tool execution finished
    ToolEnd {
        id: String,
        name: String,
        ok: bool,
    },
    /// A state-machine node began (e.g. one generate pass)
    NodeStart { node: &'static str, iteration: usize },
    /// A state-machine node finished
    NodeEnd { node: &'static str, iteration: usize },
    /// The turn was cancelled; terminal, emitted at most once
    Stopped,
    /// The turn failed; terminal
    Error { kind: String, message: String },
    /// Final message log of the turn
    History { messages: Vec<ChatMessage> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags_match_channel_protocol() {
        let json = serde_json::to_value(AgentEvent::Token { text: "hi".into() }).unwrap();
        assert_eq!(json["type"], "token");

        let json = serde_json::to_value(AgentEvent::Stopped).unwrap();
        assert_eq!(json["type"], "stopped");

        let json = serde_json::to_value(AgentEvent::ToolStart {
            id: "call-1".into(),
            name: "search_knowledge".into(),
            arguments: serde_json::json!({"query": "x"}),
        })
        .unwrap();
        assert_eq!(json["type"], "tool_start");
        assert_eq!(json["name"], "search_knowledge");
    }
}
