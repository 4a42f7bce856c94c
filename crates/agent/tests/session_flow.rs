//! Session flow scenarios against fake LLM and tool collaborators

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use docqa_agent::{AgentConfig, AgentEvent, AgentSession, SessionState};
use docqa_core::{
    ChatMessage, CompletionRequest, Error, LlmService, Result, Role, StreamEvent, ToolCallRequest,
    ToolDefinition,
};
use docqa_tools::{Tool, ToolError, ToolOutput, ToolRegistry};

/// LLM fake. The first `call_tool_times` generations that offer tools emit
/// a tool call; everything else streams the fixed tokens. `stall_after`
/// pauses the token stream forever after N tokens (for cancellation tests).
struct FakeLlm {
    tokens: Vec<&'static str>,
    stall_after: Option<usize>,
    call_tool_times: usize,
    generations: AtomicUsize,
    fail_stream: bool,
}

impl Default for FakeLlm {
    fn default() -> Self {
        Self {
            tokens: vec!["All", " done", "."],
            stall_after: None,
            call_tool_times: 0,
            generations: AtomicUsize::new(0),
            fail_stream: false,
        }
    }
}

#[async_trait]
impl LlmService for FakeLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        Ok("unused".into())
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
        _cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        if self.fail_stream {
            return Err(Error::LlmFailed("model exploded".into()));
        }

        let generation = self.generations.fetch_add(1, Ordering::SeqCst);
        let call_tool = !request.tools.is_empty() && generation < self.call_tool_times;
        let tokens: Vec<String> = self.tokens.iter().map(|t| t.to_string()).collect();
        let stall_after = self.stall_after;

        let stream = async_stream::stream! {
            if call_tool {
                yield Ok(StreamEvent::ToolCall(ToolCallRequest::new(
                    "probe",
                    serde_json::json!({"query": "anything"}),
                )));
                return;
            }
            for (index, token) in tokens.into_iter().enumerate() {
                if let Some(limit) = stall_after {
                    if index == limit {
                        std::future::pending::<()>().await;
                    }
                }
                yield Ok(StreamEvent::Token(token));
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Counting tool; optionally fails every execution.
struct ProbeTool {
    executions: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl Tool for ProbeTool {
    fn name(&self) -> &str {
        "probe"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "probe".into(),
            description: "test probe".into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    async fn execute(
        &self,
        _arguments: Value,
        _cancel: CancellationToken,
    ) -> std::result::Result<ToolOutput, ToolError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ToolError::Execution("probe broke".into()));
        }
        Ok(ToolOutput::text("probe result"))
    }
}

fn session_with(llm: FakeLlm, tool_fail: bool) -> (Arc<AgentSession>, Arc<AtomicUsize>) {
    let executions = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(ProbeTool {
        executions: executions.clone(),
        fail: tool_fail,
    });

    let session = Arc::new(AgentSession::new(
        "session-1",
        Arc::new(llm),
        Arc::new(registry),
        AgentConfig {
            system_prompt: "be helpful".into(),
            max_tool_iterations: 3,
        },
    ));
    (session, executions)
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn tool_loop_caps_at_three_executions_plus_final_generation() {
    // The LLM calls a tool on every generation that offers tools; the
    // session must run exactly 3 tool executions, then one final tool-less
    // generation, and terminate.
    let llm = FakeLlm {
        call_tool_times: usize::MAX,
        ..Default::default()
    };
    let (session, executions) = session_with(llm, false);

    let events = drain(session.run_turn("hello")).await;

    assert_eq!(executions.load(Ordering::SeqCst), 3);
    let tool_starts = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::ToolStart { .. }))
        .count();
    assert_eq!(tool_starts, 3);

    // The final generation streamed plain tokens
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Token { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "All done.");

    assert_eq!(session.state(), SessionState::Done);
    // History: user, then 3 (assistant tool-call, tool result) pairs, then
    // the final assistant answer
    let history = session.history();
    assert_eq!(history.len(), 1 + 3 * 2 + 1);
    assert_eq!(history.last().unwrap().content, "All done.");
}

#[tokio::test]
async fn tokens_arrive_in_emitted_order_and_channel_closes_once() {
    let llm = FakeLlm {
        tokens: vec!["t1", "t2", "t3", "t4", "t5"],
        ..Default::default()
    };
    let (session, _) = session_with(llm, false);

    let mut rx = session.run_turn("hello");
    let mut tokens = Vec::new();
    let mut closed = false;
    while let Some(event) = rx.recv().await {
        if let AgentEvent::Token { text } = event {
            tokens.push(text);
        }
    }
    if rx.recv().await.is_none() {
        closed = true;
    }

    assert_eq!(tokens, vec!["t1", "t2", "t3", "t4", "t5"]);
    assert!(closed);
}

#[tokio::test]
async fn cancel_mid_stream_emits_single_stopped_and_keeps_partial_text() {
    let llm = FakeLlm {
        tokens: vec!["tok1", "tok2", "tok3", "never"],
        stall_after: Some(3),
        ..Default::default()
    };
    let (session, _) = session_with(llm, false);

    let mut rx = session.run_turn("question");
    let mut seen_tokens = 0;
    let mut events_after_cancel = Vec::new();
    let mut cancelled = false;

    while let Some(event) = rx.recv().await {
        match &event {
            AgentEvent::Token { .. } => {
                seen_tokens += 1;
                assert!(!cancelled, "no tokens may follow the cancel signal");
                if seen_tokens == 3 {
                    session.cancel();
                    cancelled = true;
                }
            }
            _ if cancelled => events_after_cancel.push(event),
            _ => {}
        }
    }

    // Exactly one terminal event after the cancel, and it is `stopped`
    assert_eq!(events_after_cancel.len(), 1);
    assert!(matches!(events_after_cancel[0], AgentEvent::Stopped));
    assert_eq!(session.state(), SessionState::Cancelled);

    // Partial assistant text is persisted alongside the user message
    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "tok1tok2tok3");
}

#[tokio::test]
async fn failed_tool_appends_synthetic_error_result() {
    let llm = FakeLlm {
        call_tool_times: 1,
        ..Default::default()
    };
    let (session, executions) = session_with(llm, true);

    let events = drain(session.run_turn("hello")).await;

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolEnd { ok: false, .. })));

    // The call/result pair is structurally complete: the tool message holds
    // a synthetic error body
    let history = session.history();
    let tool_message = history
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool result message");
    let body: Value = serde_json::from_str(&tool_message.content).unwrap();
    assert_eq!(body["error"], "execution_failed");

    // The call id links the pair
    let assistant = history
        .iter()
        .find(|m| !m.tool_calls.is_empty())
        .expect("assistant tool-call message");
    assert_eq!(
        assistant.tool_calls[0].id,
        tool_message.tool_call_id.clone().unwrap()
    );

    // The loop continued to a successful final answer
    assert_eq!(session.state(), SessionState::Done);
}

#[tokio::test]
async fn stream_failure_emits_error_event() {
    let llm = FakeLlm {
        fail_stream: true,
        ..Default::default()
    };
    let (session, _) = session_with(llm, false);

    let events = drain(session.run_turn("hello")).await;

    assert!(matches!(
        events.last(),
        Some(AgentEvent::Error { kind, .. }) if kind == "llm_failed"
    ));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn turns_are_serialized_and_do_not_interleave() {
    let llm = FakeLlm {
        tokens: vec!["first"],
        ..Default::default()
    };
    let (session, _) = session_with(llm, false);

    // Start both turns before reading either stream. The second turn queues
    // behind the first; its channel stays silent until turn one closes.
    let rx1 = session.run_turn("turn one");
    let rx2 = session.run_turn("turn two");

    let events1 = drain(rx1).await;
    assert!(events1
        .iter()
        .any(|e| matches!(e, AgentEvent::Token { text } if text == "first")));

    let events2 = drain(rx2).await;
    assert!(events2
        .iter()
        .any(|e| matches!(e, AgentEvent::Token { .. })));

    assert_eq!(session.turn_count(), 2);
    let history = session.history();
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert_eq!(history[0].content, "turn one");
    assert_eq!(history[2].content, "turn two");
}

#[tokio::test]
async fn history_event_carries_turn_messages() {
    let llm = FakeLlm {
        tokens: vec!["answer"],
        ..Default::default()
    };
    let (session, _) = session_with(llm, false);

    let events = drain(session.run_turn("hello")).await;
    let history_event = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::History { messages } => Some(messages.clone()),
            _ => None,
        })
        .expect("history event");

    assert_eq!(history_event.len(), 2);
    assert_eq!(history_event[0].content, "hello");
    assert_eq!(history_event[1].content, "answer");
}

#[tokio::test]
async fn history_sink_receives_finished_turns() {
    use docqa_core::ChatHistoryStore;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        appended: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl ChatHistoryStore for RecordingSink {
        async fn append(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
            self.appended
                .lock()
                .push((session_id.to_string(), messages.len()));
            Ok(())
        }
    }

    let sink = Arc::new(RecordingSink::default());
    let executions = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(ProbeTool {
        executions,
        fail: false,
    });

    let session = Arc::new(
        AgentSession::new(
            "session-9",
            Arc::new(FakeLlm {
                call_tool_times: 1,
                ..Default::default()
            }),
            Arc::new(registry),
            AgentConfig {
                system_prompt: "be helpful".into(),
                max_tool_iterations: 3,
            },
        )
        .with_history_sink(sink.clone()),
    );

    drain(session.run_turn("hello")).await;

    let appended = sink.appended.lock().clone();
    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].0, "session-9");
    // user + tool-call pair + final answer
    assert_eq!(appended[0].1, 4);
}
