//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::types::*;
use crate::agent::{Agent, RunOptions, TurnStatus};
use crate::config::Config;
use crate::tools::{ToolCategory, ToolInfo};

/// Shared application state.
pub struct AppState {
    pub agent: Agent,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let agent = Agent::from_config(&config)?;
    let state = Arc::new(AppState { agent });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// All routes, with tracing and permissive CORS.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/api/agent/run", post(run_agent))
        .route("/api/sessions/:id", get(get_session).delete(clear_session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(status: StatusCode, message: String, code: &str) -> Response {
    let body = ErrorResponse {
        error: ErrorBody {
            message,
            code: code.to_string(),
        },
    };
    (status, Json(body)).into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        persistent_sessions: state.agent.persistent_sessions(),
    })
}

async fn list_tools(State(state): State<Arc<AppState>>, Query(query): Query<ToolsQuery>) -> Response {
    let tools = state.agent.tools().list_tools();
    let tools: Vec<ToolInfo> = match query.category {
        None => tools,
        Some(raw) => match raw.parse::<ToolCategory>() {
            Ok(category) => tools.into_iter().filter(|t| t.category == category).collect(),
            Err(message) => {
                return error_response(StatusCode::BAD_REQUEST, message, "invalid_request_error")
            }
        },
    };
    Json(ToolsResponse { tools }).into_response()
}

async fn run_agent(State(state): State<Arc<AppState>>, Json(req): Json<AgentRunRequest>) -> Response {
    if req.question.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "question is required".to_string(),
            "invalid_request_error",
        );
    }
    if req.max_iterations == Some(0) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "max_iterations must be at least 1".to_string(),
            "invalid_request_error",
        );
    }

    let session_id = req
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut options = RunOptions {
        max_iterations: req.max_iterations,
        ..RunOptions::default()
    };
    if let Some(language) = req.language {
        options.language = language;
    }

    tracing::info!(
        session = %session_id,
        language = %options.language,
        question_len = req.question.len(),
        "Received agent run request"
    );

    let result = state.agent.run(&req.question, &session_id, options).await;
    let status = match result.status {
        TurnStatus::Success => StatusCode::OK,
        TurnStatus::Error => StatusCode::BAD_GATEWAY,
    };
    (status, Json(result)).into_response()
}

async fn get_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.agent.history(&id).await {
        Ok(messages) => Json(SessionHistoryResponse {
            session_id: id,
            messages,
        })
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "storage_error"),
    }
}

async fn clear_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.agent.clear_session(&id).await {
        Ok(()) => Json(serde_json::json!({ "ok": true, "session_id": id })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "storage_error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentSettings, InMemoryConversationMemory, ResponseFinalizer};
    use crate::llm::{LlmClient, LlmError, Message, ModelReply, ToolSchema};
    use crate::tools::{DuplicatePolicy, ToolRegistry};
    use async_trait::async_trait;

    struct FixedLlm(Result<&'static str, u16>);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _messages: &[Message], _tools: &[ToolSchema]) -> Result<ModelReply, LlmError> {
            match self.0 {
                Ok(answer) => Ok(ModelReply::Final(answer.to_string())),
                Err(status) => Err(LlmError::Api {
                    status,
                    message: "unavailable".into(),
                }),
            }
        }
    }

    fn state(reply: Result<&'static str, u16>) -> Arc<AppState> {
        let agent = Agent::new(
            Arc::new(FixedLlm(reply)),
            Arc::new(ToolRegistry::with_builtin_tools(DuplicatePolicy::Reject).unwrap()),
            Arc::new(InMemoryConversationMemory::new()),
            ResponseFinalizer::new(None, "English"),
            AgentSettings::default(),
        );
        Arc::new(AppState { agent })
    }

    fn request(question: &str, session_id: Option<&str>) -> AgentRunRequest {
        AgentRunRequest {
            question: question.to_string(),
            session_id: session_id.map(str::to_string),
            language: None,
            max_iterations: None,
        }
    }

    #[tokio::test]
    async fn successful_run_is_ok_and_recorded() {
        let state = state(Ok("hello"));
        let response = run_agent(State(Arc::clone(&state)), Json(request("hi", Some("s1")))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let history = state.agent.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn model_failure_maps_to_bad_gateway() {
        let response = run_agent(State(state(Err(503))), Json(request("hi", None))).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn empty_question_is_bad_request() {
        let response = run_agent(State(state(Ok("x"))), Json(request("   ", None))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn clearing_a_session_empties_it() {
        let state = state(Ok("hello"));
        run_agent(State(Arc::clone(&state)), Json(request("hi", Some("s1")))).await;

        let response = clear_session(State(Arc::clone(&state)), Path("s1".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.agent.history("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_reports_in_memory_sessions() {
        let Json(body) = health(State(state(Ok("x")))).await;
        assert_eq!(body.status, "ok");
        assert!(!body.persistent_sessions);
    }

    #[tokio::test]
    async fn tools_can_be_filtered_by_category() {
        let state = state(Ok("x"));

        let response = list_tools(
            State(Arc::clone(&state)),
            Query(ToolsQuery {
                category: Some("math".into()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = list_tools(State(state), Query(ToolsQuery { category: Some("nope".into()) })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
