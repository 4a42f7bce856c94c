//! Agent session
//!
//! One session = one conversation: an append-only message log, a monotonic
//! turn counter, and at most one running generation. Each turn is a bounded
//! tool-calling loop; when the loop budget is exhausted a final generation
//! runs without tools so the turn always terminates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use docqa_core::{
    ChatHistoryStore, ChatMessage, CompletionRequest, Error, LlmService, StreamEvent,
    ToolCallRequest,
};
use docqa_tools::ToolExecutor;

use docqa_config::constants::agent::STREAM_CHANNEL_CAPACITY;

use crate::events::AgentEvent;

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// System prompt injected at the head of every turn
    pub system_prompt: String,
    /// Tool iterations per turn before the final tool-less generation
    pub max_tool_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from(&docqa_config::AgentSettings::default())
    }
}

impl From<&docqa_config::AgentSettings> for AgentConfig {
    fn from(settings: &docqa_config::AgentSettings) -> Self {
        Self {
            system_prompt: settings.system_prompt.clone(),
            max_tool_iterations: settings.max_tool_iterations,
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitInput,
    Generate,
    Streaming,
    ToolExec,
    Done,
    Cancelled,
    Failed,
}

enum TurnOutcome {
    Done,
    Cancelled,
    Failed { kind: &'static str, message: String },
}

/// One conversational session.
pub struct AgentSession {
    id: String,
    llm: Arc<dyn LlmService>,
    tools: Arc<dyn ToolExecutor>,
    history_sink: Option<Arc<dyn ChatHistoryStore>>,
    config: AgentConfig,
    history: Mutex<Vec<ChatMessage>>,
    state: Mutex<SessionState>,
    turn: AtomicU64,
    cancel_slot: Mutex<Option<CancellationToken>>,
    /// One generation per session at a time; turns queue here in FIFO order
    turn_gate: tokio::sync::Mutex<()>,
}

impl AgentSession {
    pub fn new(
        id: impl Into<String>,
        llm: Arc<dyn LlmService>,
        tools: Arc<dyn ToolExecutor>,
        config: AgentConfig,
    ) -> Self {
        Self {
            id: id.into(),
            llm,
            tools,
            history_sink: None,
            config,
            history: Mutex::new(Vec::new()),
            state: Mutex::new(SessionState::AwaitInput),
            turn: AtomicU64::new(0),
            cancel_slot: Mutex::new(None),
            turn_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Attach the external history sink; finished turns are handed over.
    pub fn with_history_sink(mut self, sink: Arc<dyn ChatHistoryStore>) -> Self {
        self.history_sink = Some(sink);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Turns started so far
    pub fn turn_count(&self) -> u64 {
        self.turn.load(Ordering::SeqCst)
    }

    /// Snapshot of the message log
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().clone()
    }

    /// Cancel the running generation, if any. The active LLM call is
    /// aborted, exactly one `stopped` event is emitted, and the turn's
    /// channel closes.
    pub fn cancel(&self) {
        if let Some(token) = self.cancel_slot.lock().as_ref() {
            token.cancel();
        }
    }

    /// Start a turn. Returns the single-consumer event stream; the channel
    /// is single-slot on purpose, so a slow consumer stalls the LLM read
    /// loop instead of buffering unboundedly.
    pub fn run_turn(self: &Arc<Self>, user_text: impl Into<String>) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let session = Arc::clone(self);
        let user_text = user_text.into();
        tokio::spawn(async move {
            session.drive_turn(user_text, tx).await;
        });
        rx
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    async fn drive_turn(&self, user_text: String, tx: mpsc::Sender<AgentEvent>) {
        let _gate = self.turn_gate.lock().await;

        let turn = self.turn.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *self.cancel_slot.lock() = Some(cancel.clone());

        let turn_start = {
            let mut history = self.history.lock();
            history.push(ChatMessage::user(user_text));
            history.len() - 1
        };

        tracing::debug!(session = %self.id, turn, "turn started");
        let outcome = self.tool_loop(&cancel, &tx).await;

        match outcome {
            TurnOutcome::Done => {
                self.set_state(SessionState::Done);
                let messages = self.history.lock()[turn_start..].to_vec();
                let _ = tx.send(AgentEvent::History { messages }).await;
            }
            TurnOutcome::Cancelled => {
                self.set_state(SessionState::Cancelled);
                let _ = tx.send(AgentEvent::Stopped).await;
            }
            TurnOutcome::Failed { kind, message } => {
                self.set_state(SessionState::Failed);
                tracing::warn!(session = %self.id, turn, kind, %message, "turn failed");
                let _ = tx.send(AgentEvent::Error {
                    kind: kind.to_string(),
                    message,
                })
                .await;
            }
        }

        *self.cancel_slot.lock() = None;
        self.persist_turn(turn_start).await;
        // `tx` drops here: the channel closes exactly once per turn
    }

    async fn tool_loop(&self, cancel: &CancellationToken, tx: &mpsc::Sender<AgentEvent>) -> TurnOutcome {
        let max = self.config.max_tool_iterations;

        for iteration in 0..=max {
            let offer_tools = iteration < max;
            let tools = if offer_tools {
                self.tools.definitions()
            } else {
                Vec::new()
            };

            self.set_state(SessionState::Generate);
            if tx
                .send(AgentEvent::NodeStart {
                    node: "generate",
                    iteration,
                })
                .await
                .is_err()
            {
                cancel.cancel();
                return TurnOutcome::Cancelled;
            }

            let request = CompletionRequest::new(self.prompt_messages()).with_tools(tools);
            let stream = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TurnOutcome::Cancelled,
                stream = self.llm.stream_complete(request, cancel.clone()) => stream,
            };
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(Error::Cancelled) => return TurnOutcome::Cancelled,
                Err(e) => {
                    return TurnOutcome::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };

            self.set_state(SessionState::Streaming);
            let mut text = String::new();
            let mut calls: Vec<ToolCallRequest> = Vec::new();

            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.append_partial_assistant(&text);
                        return TurnOutcome::Cancelled;
                    }
                    item = stream.next() => item,
                };

                match item {
                    None => break,
                    Some(Ok(StreamEvent::Token(token))) => {
                        text.push_str(&token);
                        if tx.send(AgentEvent::Token { text: token }).await.is_err() {
                            // Consumer went away; abort the generation
                            cancel.cancel();
                            self.append_partial_assistant(&text);
                            return TurnOutcome::Cancelled;
                        }
                    }
                    Some(Ok(StreamEvent::ToolCall(call))) => {
                        if offer_tools {
                            calls.push(call);
                        } else {
                            tracing::warn!(
                                session = %self.id,
                                tool = %call.name,
                                "tool call in the final tool-less generation, ignoring"
                            );
                        }
                    }
                    Some(Err(Error::Cancelled)) => {
                        self.append_partial_assistant(&text);
                        return TurnOutcome::Cancelled;
                    }
                    Some(Err(e)) => {
                        return TurnOutcome::Failed {
                            kind: e.kind(),
                            message: e.to_string(),
                        }
                    }
                }
            }

            let _ = tx
                .send(AgentEvent::NodeEnd {
                    node: "generate",
                    iteration,
                })
                .await;

            if calls.is_empty() {
                self.history.lock().push(ChatMessage::assistant(text));
                return TurnOutcome::Done;
            }

            // The assistant message carries its tool calls; every call gets
            // a result message so the pair is never structurally incomplete.
            {
                let mut message = ChatMessage::assistant(text);
                message.tool_calls = calls.clone();
                self.history.lock().push(message);
            }

            self.set_state(SessionState::ToolExec);
            for call in calls {
                if let Some(outcome) = self.run_tool(call, cancel, tx).await {
                    return outcome;
                }
            }
        }

        // Unreachable: the last pass offers no tools, so it always returns
        // through the no-tool-call branch above.
        TurnOutcome::Done
    }

    /// Execute one tool call and append its call/result pair. Returns a
    /// terminal outcome only when the turn must stop.
    async fn run_tool(
        &self,
        call: ToolCallRequest,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Option<TurnOutcome> {
        let _ = tx
            .send(AgentEvent::ToolStart {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            })
            .await;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(docqa_tools::ToolError::Cancelled),
            result = self.tools.execute(&call.name, call.arguments.clone(), cancel.clone()) => result,
        };

        match result {
            Ok(output) => {
                self.history
                    .lock()
                    .push(ChatMessage::tool_result(call.id.clone(), output.text));
                let _ = tx
                    .send(AgentEvent::ToolEnd {
                        id: call.id,
                        name: call.name,
                        ok: true,
                    })
                    .await;
                None
            }
            Err(docqa_tools::ToolError::Cancelled) => {
                // The partial tool result is discarded; a synthetic result
                // keeps the call/result pair structurally complete.
                self.append_synthetic_result(&call.id, "cancelled");
                Some(TurnOutcome::Cancelled)
            }
            Err(e) => {
                tracing::warn!(session = %self.id, tool = %call.name, error = %e, "tool failed");
                self.append_synthetic_result(&call.id, e.kind());
                let _ = tx
                    .send(AgentEvent::ToolEnd {
                        id: call.id,
                        name: call.name,
                        ok: false,
                    })
                    .await;
                None
            }
        }
    }

    /// Messages for the next LLM call: system prompt plus the full log.
    fn prompt_messages(&self) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.config.system_prompt.clone())];
        messages.extend(self.history.lock().iter().cloned());
        messages
    }

    /// Tokens already delivered to the consumer before a cancel are kept in
    /// history as the turn's assistant message.
    fn append_partial_assistant(&self, text: &str) {
        if !text.is_empty() {
            self.history.lock().push(ChatMessage::assistant(text));
        }
    }

    fn append_synthetic_result(&self, call_id: &str, kind: &str) {
        let body = serde_json::json!({ "error": kind }).to_string();
        self.history
            .lock()
            .push(ChatMessage::tool_result(call_id, body));
    }

    async fn persist_turn(&self, turn_start: usize) {
        let Some(sink) = self.history_sink.as_ref() else {
            return;
        };
        let messages = self.history.lock()[turn_start..].to_vec();
        if messages.is_empty() {
            return;
        }
        if let Err(e) = sink.append(&self.id, &messages).await {
            tracing::warn!(session = %self.id, error = %e, "history sink append failed");
        }
    }
}
