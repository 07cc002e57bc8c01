//! Model capability boundary.
//!
//! The agent only sees the types defined here: [`Message`] for dialogue,
//! [`ToolCallRequest`] for tool invocations the model asks for, and the
//! tagged [`ModelReply`] that a [`LlmClient`] returns. Provider wire formats
//! stay inside the concrete client implementations.

mod openrouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use openrouter::OpenRouterClient;

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation token, unique within one assistant message
    pub id: String,

    /// Registered tool name
    pub name: String,

    /// Parameter name to value
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A unit of dialogue.
///
/// Messages are never edited after creation; corrections are new messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    /// Text content; empty when an assistant message only carries tool calls
    #[serde(default)]
    pub content: String,

    /// Tool invocations, only ever non-empty on assistant messages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Set on tool messages: the id of the request this observation answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant message carrying tool invocation requests.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Observation for the request with the given id.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Tool metadata advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

/// What the model answered, decided once at the client boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Terminal free-text answer.
    Final(String),
    /// One or more tool invocations; `content` is any accompanying text.
    ToolRequests {
        content: String,
        calls: Vec<ToolCallRequest>,
    },
}

impl ModelReply {
    /// Classify a raw assistant turn.
    pub fn from_parts(content: Option<String>, calls: Vec<ToolCallRequest>) -> Self {
        let content = content.unwrap_or_default();
        if calls.is_empty() {
            ModelReply::Final(content)
        } else {
            ModelReply::ToolRequests { content, calls }
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Http(String),

    #[error("model API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not decode model response: {0}")]
    Decode(String),

    #[error("model call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("model returned no choices")]
    EmptyResponse,
}

/// A chat completion service able to request tool invocations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete the conversation. `tools` is empty when no tools are offered.
    async fn complete(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<ModelReply, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_without_calls_is_final() {
        let reply = ModelReply::from_parts(Some("done".to_string()), vec![]);
        assert_eq!(reply, ModelReply::Final("done".to_string()));

        let reply = ModelReply::from_parts(None, vec![]);
        assert_eq!(reply, ModelReply::Final(String::new()));
    }

    #[test]
    fn reply_with_calls_is_tool_requests() {
        let call = ToolCallRequest::new("c1", "echo", Map::new());
        let reply = ModelReply::from_parts(None, vec![call.clone()]);
        assert_eq!(
            reply,
            ModelReply::ToolRequests {
                content: String::new(),
                calls: vec![call]
            }
        );
    }

    #[test]
    fn message_serialization_omits_empty_tool_fields() {
        let value = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));

        let value = serde_json::to_value(Message::tool("c1", "ok")).unwrap();
        assert_eq!(value, json!({"role": "tool", "content": "ok", "tool_call_id": "c1"}));
    }
}
