//! Conversational agent sessions
//!
//! Drives one conversational turn as a bounded tool-calling loop against the
//! LLM, streaming tokens and structured events to a single consumer. One
//! generation runs per session at a time; a cancel signal aborts the active
//! LLM call, emits exactly one `stopped` event, and closes the stream.

pub mod events;
pub mod session;

pub use events::AgentEvent;
pub use session::{AgentConfig, AgentSession, SessionState};
