//! Agent module - the core agent logic.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build context with system prompt, session history and the question
//! 2. Call the model with the available tools
//! 3. If the model requests tool calls, dispatch them and feed the observations back
//! 4. Repeat until the model answers or max iterations is reached
//! 5. Translate the answer if asked, then commit the turn to session memory

mod agent_loop;
mod dispatcher;
mod finalizer;
mod memory;
mod prompt;

pub use agent_loop::{
    Agent, AgentSettings, AgentTurnResult, LogEntryType, RunOptions, TurnLogEntry, TurnStatus,
    INSUFFICIENT_INFORMATION_ANSWER,
};
pub use dispatcher::{Observation, ToolDispatcher, TOOL_ERROR_MARKER};
pub use finalizer::{LlmTranslator, ResponseFinalizer, Translator, NATIVE_LANGUAGE_MARKER};
pub use memory::{
    ConversationMemory, InMemoryConversationMemory, MemoryError, SessionLocks, SqliteConversationMemory,
};
pub use prompt::build_system_prompt;
