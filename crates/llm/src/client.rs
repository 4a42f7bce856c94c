//! OpenAI-compatible chat client
//!
//! Non-streaming completions for pipeline stages (HyDE, rerank, answer) and
//! SSE streaming with mid-stream tool calls for the agent loop. Transient
//! failures of non-streaming calls retry with jittered exponential backoff;
//! streaming calls never retry (the consumer already saw partial output).

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use docqa_core::{
    ChatMessage, CompletionRequest, Error, LlmService, Result, Role, StreamEvent, ToolCallRequest,
};

use crate::{is_retryable, LlmError};

/// Chat client configuration
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// API base URL (".../v1")
    pub endpoint: String,
    /// Default model
    pub model: String,
    /// Bearer token (optional for local backends)
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Non-streaming request timeout
    pub complete_timeout: Duration,
    /// Streaming overall timeout
    pub stream_timeout: Duration,
    /// Per-token inactivity timeout while streaming
    pub token_idle_timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff, doubled each retry with jitter
    pub initial_backoff: Duration,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self::from(&docqa_config::LlmSettings::default())
    }
}

impl From<&docqa_config::LlmSettings> for LlmClientConfig {
    fn from(settings: &docqa_config::LlmSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            complete_timeout: Duration::from_millis(settings.complete_timeout_ms),
            stream_timeout: Duration::from_millis(settings.stream_timeout_ms),
            token_idle_timeout: Duration::from_millis(settings.token_idle_timeout_ms),
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
        }
    }
}

/// OpenAI-compatible HTTP client implementing [`LlmService`].
#[derive(Clone)]
pub struct HttpLlmClient {
    client: Client,
    config: LlmClientConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmClientConfig) -> std::result::Result<Self, LlmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    /// Rough token estimate for prompt budgeting (~4 graphemes per token).
    pub fn estimate_tokens(&self, text: &str) -> usize {
        use unicode_segmentation::UnicodeSegmentation;
        text.graphemes(true).count().max(1) / 4
    }

    fn wire_request(&self, request: &CompletionRequest, stream: bool) -> ChatRequest {
        ChatRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: request.temperature.unwrap_or(self.config.temperature),
            stream,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(
                    request
                        .tools
                        .iter()
                        .map(|t| WireTool {
                            kind: "function",
                            function: WireFunctionDef {
                                name: t.name.clone(),
                                description: t.description.clone(),
                                parameters: t.parameters.clone(),
                            },
                        })
                        .collect(),
                )
            },
        }
    }

    fn request_builder(&self, body: &ChatRequest, timeout: Duration) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(self.chat_url()).timeout(timeout).json(body);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn execute_complete(
        &self,
        body: &ChatRequest,
    ) -> std::result::Result<ChatResponse, LlmError> {
        let response = self
            .request_builder(body, self.config.complete_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("server error {}: {}", status, text)));
            }
            return Err(LlmError::Api(format!("{}: {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmService for HttpLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = self.wire_request(&request, false);

        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let jitter = Duration::from_millis(
                    rand::thread_rng().gen_range(0..=backoff.as_millis().max(1) as u64 / 2),
                );
                tracing::warn!(
                    attempt,
                    max = self.config.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "llm request failed, retrying"
                );
                tokio::time::sleep(backoff + jitter).await;
                backoff *= 2;
            }

            match self.execute_complete(&body).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .unwrap_or_default();
                    return Ok(content);
                }
                Err(e) if is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Network("max retries exceeded".into()))
            .into())
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let body = self.wire_request(&request, true);
        let response = self
            .request_builder(&body, self.config.stream_timeout)
            .send()
            .await
            .map_err(LlmError::from)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{}: {}", status, text)).into());
        }

        let deadline = Instant::now() + self.config.stream_timeout;
        let token_idle = self.config.token_idle_timeout;

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut line_buf = String::new();
            // Tool-call fragments keyed by choice index, flushed on finish
            let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();

            loop {
                if Instant::now() >= deadline {
                    yield Err(Error::LlmFailed("stream exceeded overall timeout".into()));
                    return;
                }

                let step = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    chunk = tokio::time::timeout(token_idle, bytes.next()) => Some(chunk),
                };
                let Some(chunk) = step else {
                    // Dropping `bytes` closes the connection and releases
                    // the socket.
                    yield Err(Error::Cancelled);
                    return;
                };

                let chunk = match chunk {
                    Err(_) => {
                        yield Err(Error::LlmFailed("stream idle past token timeout".into()));
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        yield Err(Error::LlmFailed(format!("stream read: {}", e)));
                        return;
                    }
                    Ok(Some(Ok(chunk))) => chunk,
                };

                line_buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = line_buf.find('\n') {
                    let line: String = line_buf.drain(..=newline).collect();
                    let line = line.trim();
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        for call in std::mem::take(&mut pending).into_values() {
                            yield Ok(StreamEvent::ToolCall(call.into_request()));
                        }
                        return;
                    }

                    let parsed: StreamChunk = match serde_json::from_str(data) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable stream line");
                            continue;
                        }
                    };

                    let Some(choice) = parsed.choices.into_iter().next() else {
                        continue;
                    };

                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            yield Ok(StreamEvent::Token(content));
                        }
                    }

                    for fragment in choice.delta.tool_calls.unwrap_or_default() {
                        let entry = pending.entry(fragment.index).or_default();
                        if let Some(id) = fragment.id {
                            entry.id = id;
                        }
                        if let Some(function) = fragment.function {
                            if let Some(name) = function.name {
                                entry.name.push_str(&name);
                            }
                            if let Some(arguments) = function.arguments {
                                entry.arguments.push_str(&arguments);
                            }
                        }
                    }

                    if matches!(choice.finish_reason.as_deref(), Some("tool_calls")) {
                        for call in std::mem::take(&mut pending).into_values() {
                            yield Ok(StreamEvent::ToolCall(call.into_request()));
                        }
                    }
                }
            }

            // Stream ended without [DONE]; flush anything still pending
            for call in pending.into_values() {
                yield Ok(StreamEvent::ToolCall(call.into_request()));
            }
        };

        Ok(stream.boxed())
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn into_request(self) -> ToolCallRequest {
        let arguments = serde_json::from_str(&self.arguments)
            .unwrap_or(serde_json::Value::Object(Default::default()));
        ToolCallRequest {
            id: if self.id.is_empty() {
                uuid_like_id(&self.name)
            } else {
                self.id
            },
            name: self.name,
            arguments,
        }
    }
}

/// Some backends omit tool-call ids; synthesize one so history pairing holds.
fn uuid_like_id(name: &str) -> String {
    format!("call-{}-{}", name, rand::thread_rng().gen::<u32>())
}

// Wire types (OpenAI chat completion shapes)

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: c.id.clone(),
                        kind: "function",
                        function: WireFunctionCall {
                            name: c.name.clone(),
                            arguments: c.arguments.to_string(),
                        },
                    })
                    .collect(),
            )
        };
        Self {
            role,
            content: message.content.clone(),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

#[derive(Debug, Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallFragment>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallFragment {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionFragment>,
}

#[derive(Debug, Deserialize)]
struct FunctionFragment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::ToolDefinition;

    #[test]
    fn test_wire_message_roles() {
        let wire = WireMessage::from(&ChatMessage::system("s"));
        assert_eq!(wire.role, "system");
        let wire = WireMessage::from(&ChatMessage::tool_result("id-1", "out"));
        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id.as_deref(), Some("id-1"));
    }

    #[test]
    fn test_tools_serialized_as_functions() {
        let client = HttpLlmClient::new(LlmClientConfig::default()).unwrap();
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]).with_tools(vec![
            ToolDefinition {
                name: "search_knowledge".into(),
                description: "search".into(),
                parameters: serde_json::json!({"type": "object"}),
            },
        ]);
        let wire = client.wire_request(&request, false);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "search_knowledge");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_stream_chunk_parses_tool_fragment() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call-1","function":{"name":"search_knowledge","arguments":"{\"qu"}}]},"finish_reason":null}]}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        let fragment = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(fragment.id.as_deref(), Some("call-1"));
    }

    #[test]
    fn test_pending_tool_call_tolerates_partial_arguments() {
        let pending = PendingToolCall {
            id: "call-1".into(),
            name: "search_knowledge".into(),
            arguments: "{\"query\": \"unterminated".into(),
        };
        let request = pending.into_request();
        // Unparseable arguments degrade to an empty object
        assert!(request.arguments.is_object());
    }

    #[test]
    fn test_token_estimate_nonzero() {
        let client = HttpLlmClient::new(LlmClientConfig::default()).unwrap();
        assert!(client.estimate_tokens("a reasonably sized sentence here") > 0);
    }
}
