//! OpenAI-compatible chat completions client (OpenRouter by default).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{LlmClient, LlmError, Message, ModelReply, Role, ToolCallRequest, ToolSchema};

/// Client for any `/chat/completions` endpoint speaking the OpenAI format.
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments object
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction<'a>,
}

#[derive(Serialize)]
struct WireToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

fn function_kind() -> String {
    "function".to_string()
}

fn to_wire(message: &Message) -> WireMessage {
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: WireFunction {
                        name: call.name.clone(),
                        arguments: Value::Object(call.arguments.clone()).to_string(),
                    },
                })
                .collect(),
        )
    };

    // Assistant turns that only carry tool calls are sent with null content.
    let content = if message.role == Role::Assistant && message.content.is_empty() && tool_calls.is_some() {
        None
    } else {
        Some(message.content.clone())
    };

    WireMessage {
        role: message.role.as_str(),
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn from_wire_call(call: WireToolCall) -> ToolCallRequest {
    let arguments = parse_arguments(&call.function.name, &call.function.arguments);
    ToolCallRequest {
        id: call.id,
        name: call.function.name,
        arguments,
    }
}

/// Parse a JSON-encoded arguments string into a mapping.
fn parse_arguments(tool: &str, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(tool = %tool, "Tool arguments are not an object: {}", other);
            Map::new()
        }
        Err(e) => {
            tracing::warn!(tool = %tool, "Unparseable tool arguments: {}", e);
            Map::new()
        }
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<ModelReply, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire).collect(),
            tools: if tools.is_empty() {
                None
            } else {
                Some(
                    tools
                        .iter()
                        .map(|t| WireTool {
                            kind: "function",
                            function: WireToolFunction {
                                name: &t.name,
                                description: &t.description,
                                parameters: &t.parameters,
                            },
                        })
                        .collect(),
                )
            },
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_body(response.text().await);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let choice = body.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;
        let calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(from_wire_call)
            .collect();

        Ok(ModelReply::from_parts(choice.message.content, calls))
    }
}

/// Body of a failed response, or why it could not be read.
fn error_body<E: std::fmt::Display>(body: Result<String, E>) -> String {
    match body {
        Ok(text) => text,
        Err(e) => format!("<unreadable body: {}>", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_tool_call_message_has_null_content_on_the_wire() {
        let mut args = Map::new();
        args.insert("text".to_string(), json!("hi"));
        let message = Message::assistant_tool_calls("", vec![ToolCallRequest::new("c1", "echo", args)]);

        let wire = serde_json::to_value(to_wire(&message)).unwrap();
        assert_eq!(wire["role"], "assistant");
        assert!(wire["content"].is_null());
        assert_eq!(wire["tool_calls"][0]["id"], "c1");
        assert_eq!(wire["tool_calls"][0]["type"], "function");
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], r#"{"text":"hi"}"#);
    }

    #[test]
    fn tool_message_keeps_correlation_id() {
        let wire = serde_json::to_value(to_wire(&Message::tool("c9", "result"))).unwrap();
        assert_eq!(wire["tool_call_id"], "c9");
        assert_eq!(wire["content"], "result");
    }

    #[test]
    fn response_tool_calls_are_parsed_into_mappings() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "a", "type": "function", "function": {"name": "calculator", "arguments": "{\"expression\": \"1+1\"}"}},
                        {"id": "b", "type": "function", "function": {"name": "broken", "arguments": "{not json"}}
                    ]
                }
            }]
        });
        let body: ChatResponse = serde_json::from_value(raw).unwrap();
        let message = body.choices.into_iter().next().unwrap().message;
        let calls: Vec<ToolCallRequest> = message.tool_calls.unwrap().into_iter().map(from_wire_call).collect();

        assert_eq!(calls[0].name, "calculator");
        assert_eq!(calls[0].arguments["expression"], "1+1");
        assert_eq!(calls[1].id, "b");
        assert!(calls[1].arguments.is_empty());
    }

    #[test]
    fn missing_call_id_deserializes_as_empty() {
        let call: WireToolCall =
            serde_json::from_value(json!({"function": {"name": "echo", "arguments": "{}"}})).unwrap();
        assert_eq!(call.id, "");
        assert_eq!(call.kind, "function");
    }

    #[test]
    fn completions_url_trims_trailing_slash() {
        let client = OpenRouterClient::new("k".into(), "https://example.com/v1/".into(), "m".into());
        assert_eq!(client.completions_url(), "https://example.com/v1/chat/completions");
    }

    #[test]
    fn unreadable_error_body_is_reported() {
        assert_eq!(error_body::<String>(Ok("rate limited".into())), "rate limited");
        assert_eq!(
            error_body(Err("connection closed")),
            "<unreadable body: connection closed>"
        );
    }
}
