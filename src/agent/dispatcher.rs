//! Tool call dispatch.
//!
//! Every tool invocation runs inside a failure boundary: unknown names,
//! errors, panics and timeouts all come back as observation strings starting
//! with [`TOOL_ERROR_MARKER`], so one broken tool never ends the turn.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::llm::ToolCallRequest;
use crate::tools::ToolRegistry;

/// Prefix of every observation produced by a failed tool call.
pub const TOOL_ERROR_MARKER: &str = "[tool_error]";

/// Result of one dispatched tool call, ready to be fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub content: String,
    /// Whether the tool ran and returned normally
    pub succeeded: bool,
}

impl Observation {
    fn success(content: String) -> Self {
        Self {
            content,
            succeeded: true,
        }
    }

    fn failure(detail: impl std::fmt::Display) -> Self {
        Self {
            content: format!("{} {}", TOOL_ERROR_MARKER, detail),
            succeeded: false,
        }
    }
}

/// Resolves tool call requests against a registry and executes them.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Option<Duration>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: None,
        }
    }

    /// Bound each invocation. Tools that block the thread without yielding
    /// cannot be interrupted and must enforce their own limits.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute one request and normalize the outcome into an observation.
    pub async fn dispatch(&self, request: &ToolCallRequest) -> Observation {
        let Some(tool) = self.registry.resolve(&request.name) else {
            tracing::warn!(tool = %request.name, "Model requested unknown tool");
            return Observation::failure(format!("unknown tool: {}", request.name));
        };

        tracing::debug!(tool = %request.name, call_id = %request.id, "Dispatching tool call");

        let invocation = AssertUnwindSafe(tool.execute(&request.arguments)).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(tool = %request.name, "Tool call timed out after {:?}", limit);
                    return Observation::failure(format!(
                        "{} timed out after {} seconds",
                        request.name,
                        limit.as_secs_f64()
                    ));
                }
            },
            None => invocation.await,
        };

        match outcome {
            Ok(Ok(output)) => Observation::success(output),
            Ok(Err(e)) => {
                tracing::warn!(tool = %request.name, "Tool call failed: {:#}", e);
                Observation::failure(format!("{} failed: {:#}", request.name, e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(tool = %request.name, "Tool panicked: {}", message);
                Observation::failure(format!("{} panicked: {}", request.name, message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Calculator, FnTool, Tool, ToolArgs};
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps for a long time"
        }

        async fn execute(&self, _args: &ToolArgs) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("finally".into())
        }
    }

    fn request(name: &str, args: serde_json::Value) -> ToolCallRequest {
        let arguments = match args {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        };
        ToolCallRequest::new("call_1", name, arguments)
    }

    fn dispatcher(tools: Vec<FnTool>) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        ToolDispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn successful_call_returns_output_verbatim() {
        let d = dispatcher(vec![FnTool::new("echo", "echo", |args| {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        })]);
        let obs = d.dispatch(&request("echo", json!({"text": "hi"}))).await;
        assert_eq!(obs, Observation::success("hi".into()));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_observation() {
        let d = dispatcher(vec![]);
        let obs = d.dispatch(&request("nope", json!({}))).await;
        assert!(!obs.succeeded);
        assert_eq!(obs.content, "[tool_error] unknown tool: nope");
    }

    #[tokio::test]
    async fn tool_error_is_marked_and_tool_stays_callable() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let d = dispatcher(vec![FnTool::new("flaky", "always fails", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("connection reset"))
        })]);

        for _ in 0..2 {
            let obs = d.dispatch(&request("flaky", json!({}))).await;
            assert!(obs.content.starts_with(TOOL_ERROR_MARKER));
            assert!(obs.content.contains("connection reset"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_tool_is_contained() {
        let d = dispatcher(vec![FnTool::new("boom", "panics", |_| panic!("kaboom"))]);
        let obs = d.dispatch(&request("boom", json!({}))).await;
        assert!(!obs.succeeded);
        assert_eq!(obs.content, "[tool_error] boom panicked: kaboom");
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool).unwrap();
        let d = ToolDispatcher::new(Arc::new(registry)).with_timeout(Some(Duration::from_millis(20)));

        let obs = d.dispatch(&request("slow", json!({}))).await;
        assert!(!obs.succeeded);
        assert!(obs.content.starts_with("[tool_error] slow timed out"));
    }

    #[tokio::test]
    async fn deeply_nested_calculator_input_is_an_observation() {
        let mut registry = ToolRegistry::new();
        registry.register(Calculator).unwrap();
        let d = ToolDispatcher::new(Arc::new(registry));

        for expression in [format!("{}1", "-".repeat(200_000)), format!("{}1", "(".repeat(500))] {
            let obs = d.dispatch(&request("calculator", json!({ "expression": expression }))).await;
            assert!(!obs.succeeded);
            assert!(obs.content.starts_with("[tool_error] calculator failed:"));
        }

        let obs = d.dispatch(&request("calculator", json!({"expression": "6 * 7"}))).await;
        assert_eq!(obs, Observation::success("42".into()));
    }
}
