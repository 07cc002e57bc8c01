//! Core agent loop implementation.
//!
//! One call to [`Agent::run`] is one turn: render, call the model, dispatch
//! any requested tools, feed the observations back, and repeat until the
//! model answers without tool calls or the iteration bound is hit. Nothing
//! reaches session memory until the turn has an answer.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::dispatcher::ToolDispatcher;
use super::finalizer::{LlmTranslator, ResponseFinalizer, Translator, NATIVE_LANGUAGE_MARKER};
use super::memory::{ConversationMemory, InMemoryConversationMemory, MemoryError, SessionLocks, SqliteConversationMemory};
use super::prompt::build_system_prompt;
use crate::config::Config;
use crate::llm::{LlmClient, LlmError, Message, ModelReply, OpenRouterClient, ToolCallRequest, ToolSchema};
use crate::tools::ToolRegistry;

/// Answer used when the iteration bound is exhausted.
pub const INSUFFICIENT_INFORMATION_ANSWER: &str =
    "I could not gather enough information to give a confident answer. Please try rephrasing or narrowing the question.";

const CANCELLED_ANSWER: &str = "The request was cancelled before an answer was produced.";

/// Turn outcome reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Success,
    Error,
}

/// Types of log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    /// The model was called
    ModelCall,
    /// Tool is being called
    ToolCall,
    /// Tool returned a result
    ToolResult,
    /// Agent produced final response
    Response,
    /// An error occurred
    Error,
}

/// A single entry in the turn execution log.
#[derive(Debug, Clone, Serialize)]
pub struct TurnLogEntry {
    /// Timestamp (RFC 3339)
    pub timestamp: String,

    pub entry_type: LogEntryType,

    pub content: String,
}

/// Result of one [`Agent::run`] call.
#[derive(Debug, Clone, Serialize)]
pub struct AgentTurnResult {
    pub session_id: String,
    pub question: String,
    /// Caller-visible answer (translated when a language was requested)
    pub answer: String,
    /// Number of model calls made
    pub iterations: usize,
    /// Tools that ran successfully during the turn
    pub tools_used: BTreeSet<String>,
    pub status: TurnStatus,
    pub log: Vec<TurnLogEntry>,
}

/// Per-call options for [`Agent::run`]. Unset fields fall back to the
/// agent's settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Target language of the answer; `"native"` disables translation
    pub language: String,
    pub max_iterations: Option<usize>,
    pub model_timeout: Option<Duration>,
    pub tool_timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            language: NATIVE_LANGUAGE_MARKER.to_string(),
            max_iterations: None,
            model_timeout: None,
            tool_timeout: None,
            cancel: None,
        }
    }
}

/// Agent-wide defaults.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub model_timeout: Option<Duration>,
    pub tool_timeout: Option<Duration>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            model_timeout: None,
            tool_timeout: None,
        }
    }
}

enum ModelCallError {
    Cancelled,
    Failed(LlmError),
}

/// The tool-augmented conversational agent.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    memory: Arc<dyn ConversationMemory>,
    finalizer: ResponseFinalizer,
    locks: SessionLocks,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        memory: Arc<dyn ConversationMemory>,
        finalizer: ResponseFinalizer,
        settings: AgentSettings,
    ) -> Self {
        Self {
            llm,
            tools,
            memory,
            finalizer,
            locks: SessionLocks::new(),
            settings,
        }
    }

    /// Wire up an agent from configuration: OpenAI-compatible model,
    /// built-in tools, and in-memory or SQLite sessions.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let llm: Arc<dyn LlmClient> = Arc::new(OpenRouterClient::new(
            config.api_key.clone(),
            config.llm_base_url.clone(),
            config.default_model.clone(),
        ));
        let tools = Arc::new(ToolRegistry::with_builtin_tools(config.duplicate_tools)?);

        let memory: Arc<dyn ConversationMemory> = match &config.session_db_path {
            Some(path) => {
                tracing::info!("Persisting sessions to {}", path.display());
                Arc::new(SqliteConversationMemory::open(path)?)
            }
            None => Arc::new(InMemoryConversationMemory::new()),
        };

        let translator: Arc<dyn Translator> = Arc::new(LlmTranslator::new(Arc::clone(&llm), config.model_timeout));
        let finalizer = ResponseFinalizer::new(Some(translator), config.native_language.clone());

        let settings = AgentSettings {
            max_iterations: config.max_iterations,
            model_timeout: config.model_timeout,
            tool_timeout: config.tool_timeout,
        };

        Ok(Self::new(llm, tools, memory, finalizer, settings))
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn persistent_sessions(&self) -> bool {
        self.memory.is_persistent()
    }

    /// Committed history of a session.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        self.memory.get(session_id).await
    }

    /// Clear a session, waiting for any turn in progress on it.
    pub async fn clear_session(&self, session_id: &str) -> Result<(), MemoryError> {
        let _guard = self.locks.acquire(session_id).await;
        self.memory.clear(session_id).await
    }

    /// Answer one question within a session. Never fails: every error is
    /// reported through the returned status and answer.
    pub async fn run(&self, question: &str, session_id: &str, options: RunOptions) -> AgentTurnResult {
        let mut turn = TurnRecorder::new(question, session_id);
        let cancel = options.cancel.clone().unwrap_or_default();
        let max_iterations = options.max_iterations.unwrap_or(self.settings.max_iterations);
        let model_timeout = options.model_timeout.or(self.settings.model_timeout);
        let tool_timeout = options.tool_timeout.or(self.settings.tool_timeout);

        if question.trim().is_empty() {
            return turn.fail("The question is empty.");
        }
        if max_iterations == 0 {
            return turn.fail("max_iterations must be at least 1.");
        }

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return turn.cancelled(),
            guard = self.locks.acquire(session_id) => guard,
        };

        tracing::info!(session = %session_id, "Starting turn: {}", truncate_for_log(question, 200));

        let history = match self.memory.get(session_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(session = %session_id, "Could not load session history: {}", e);
                return turn.fail(format!("I couldn't load this conversation's history: {}", e));
            }
        };

        let native_question = self.finalizer.translate_inbound(question, &options.language).await;
        let system = Message::system(build_system_prompt(&self.tools, self.finalizer.native_language()));
        let schemas = self.tools.schemas();
        let dispatcher = ToolDispatcher::new(Arc::clone(&self.tools)).with_timeout(tool_timeout);

        // Scratch messages for this turn; committed together at the end.
        let mut scratch = vec![Message::user(native_question)];
        let mut final_answer = None;

        while turn.iterations < max_iterations {
            if cancel.is_cancelled() {
                return turn.cancelled();
            }

            let mut messages = Vec::with_capacity(1 + history.len() + scratch.len());
            messages.push(system.clone());
            messages.extend(history.iter().cloned());
            messages.extend(scratch.iter().cloned());

            turn.iterations += 1;
            tracing::debug!(session = %session_id, "Agent iteration {}", turn.iterations);
            turn.log(LogEntryType::ModelCall, format!("Model call {} with {} messages", turn.iterations, messages.len()));

            let reply = match self.call_model(&messages, &schemas, model_timeout, &cancel).await {
                Ok(reply) => reply,
                Err(ModelCallError::Cancelled) => return turn.cancelled(),
                Err(ModelCallError::Failed(e)) => {
                    tracing::error!(session = %session_id, "Model call failed: {}", e);
                    return turn.fail(format!(
                        "I couldn't complete your request because the language model service failed: {}",
                        e
                    ));
                }
            };

            let (content, calls) = match reply {
                ModelReply::Final(content) => {
                    final_answer = Some(content);
                    break;
                }
                ModelReply::ToolRequests { content, calls } => (content, assign_call_ids(calls, turn.iterations)),
            };

            scratch.push(Message::assistant_tool_calls(content, calls.clone()));

            // Sequential on purpose: observations keep the order of the requests.
            for call in &calls {
                if cancel.is_cancelled() {
                    return turn.cancelled();
                }

                turn.log(
                    LogEntryType::ToolCall,
                    format!("Calling tool: {} with args: {}", call.name, serde_json::Value::Object(call.arguments.clone())),
                );

                let observation = dispatcher.dispatch(call).await;
                if observation.succeeded {
                    turn.tools_used.insert(call.name.clone());
                }

                turn.log(LogEntryType::ToolResult, truncate_for_log(&observation.content, 1000));
                scratch.push(Message::tool(call.id.clone(), observation.content));
            }
        }

        let answer = match final_answer {
            Some(answer) if !answer.trim().is_empty() => answer,
            Some(_) => {
                tracing::warn!(session = %session_id, "Model returned an empty answer");
                INSUFFICIENT_INFORMATION_ANSWER.to_string()
            }
            None => {
                tracing::warn!(
                    session = %session_id,
                    "Max iterations ({}) reached without a final answer",
                    max_iterations
                );
                INSUFFICIENT_INFORMATION_ANSWER.to_string()
            }
        };
        turn.log(LogEntryType::Response, truncate_for_log(&answer, 2000));

        match self
            .finalizer
            .finalize(self.memory.as_ref(), session_id, scratch, answer, &options.language)
            .await
        {
            Ok(visible) => {
                tracing::info!(
                    session = %session_id,
                    iterations = turn.iterations,
                    "Turn complete"
                );
                turn.succeed(visible)
            }
            Err(e) => {
                tracing::error!(session = %session_id, "Could not commit turn: {}", e);
                turn.fail(format!("I found an answer but couldn't save it to the conversation: {}", e))
            }
        }
    }

    async fn call_model(
        &self,
        messages: &[Message],
        schemas: &[ToolSchema],
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ModelReply, ModelCallError> {
        let call = self.llm.complete(messages, schemas);
        let bounded = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .unwrap_or(Err(LlmError::Timeout(limit))),
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ModelCallError::Cancelled),
            reply = bounded => reply.map_err(ModelCallError::Failed),
        }
    }
}

/// Give every request a non-empty id that is unique within the batch.
fn assign_call_ids(calls: Vec<ToolCallRequest>, iteration: usize) -> Vec<ToolCallRequest> {
    let mut seen = HashSet::new();
    calls
        .into_iter()
        .enumerate()
        .map(|(index, mut call)| {
            if call.id.is_empty() || seen.contains(&call.id) {
                let mut candidate = format!("call_{}_{}", iteration, index);
                while seen.contains(&candidate) {
                    candidate.push('_');
                }
                tracing::debug!(tool = %call.name, "Assigned tool call id {}", candidate);
                call.id = candidate;
            }
            seen.insert(call.id.clone());
            call
        })
        .collect()
}

/// Accumulates the caller-visible record of a turn.
struct TurnRecorder {
    session_id: String,
    question: String,
    iterations: usize,
    tools_used: BTreeSet<String>,
    log: Vec<TurnLogEntry>,
}

impl TurnRecorder {
    fn new(question: &str, session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            question: question.to_string(),
            iterations: 0,
            tools_used: BTreeSet::new(),
            log: Vec::new(),
        }
    }

    fn log(&mut self, entry_type: LogEntryType, content: String) {
        self.log.push(TurnLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            entry_type,
            content,
        });
    }

    fn finish(self, answer: String, status: TurnStatus) -> AgentTurnResult {
        AgentTurnResult {
            session_id: self.session_id,
            question: self.question,
            answer,
            iterations: self.iterations,
            tools_used: self.tools_used,
            status,
            log: self.log,
        }
    }

    fn succeed(self, answer: String) -> AgentTurnResult {
        self.finish(answer, TurnStatus::Success)
    }

    fn fail(mut self, answer: impl Into<String>) -> AgentTurnResult {
        let answer = answer.into();
        self.log(LogEntryType::Error, answer.clone());
        self.finish(answer, TurnStatus::Error)
    }

    fn cancelled(self) -> AgentTurnResult {
        tracing::info!(session = %self.session_id, "Turn cancelled");
        self.fail(CANCELLED_ANSWER)
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}... [truncated]", &s[..cut]),
        None => s.to_string(),
    }
}
