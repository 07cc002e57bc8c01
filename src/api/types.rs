//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::llm::Message;
use crate::tools::ToolInfo;

/// Request to run one agent turn.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentRunRequest {
    /// The user's question
    pub question: String,

    /// Session to continue; a new one is created when absent
    pub session_id: Option<String>,

    /// Answer language (`"native"` when absent)
    pub language: Option<String>,

    /// Optional iteration bound override
    pub max_iterations: Option<usize>,
}

/// Committed history of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHistoryResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// Optional filter for the tool listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsQuery {
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolInfo>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Whether sessions survive a restart
    pub persistent_sessions: bool,
}

/// Error body returned for rejected requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: String,
}
