//! Anthropic Messages API client
//!
//! Wire differences from the OpenAI family: `system` is a top-level string,
//! assistant tool calls are `tool_use` content blocks, tool results are
//! user-role `tool_result` blocks carrying the `tool_use_id`, and reasoning
//! is enabled through a `thinking` budget derived from the effort hint.

use reqwest::{header, Client};
use secrecy::ExposeSecret;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::ChatClient;
use super::openai::classify_http_error;
use super::types::{ChatMessage, ChatRequest, ChatResult, ChatRole, ChatToolCall, ToolChoice};
use crate::config::AnthropicConfig;
use crate::error::{Error, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    /// Create a new Anthropic client
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut key = header::HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(AnthropicClient { client, config })
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let (system, messages) = wire_messages(&request.messages);

        let mut body = Map::new();
        body.insert("model".into(), Value::String(self.config.model.clone()));
        body.insert("max_tokens".into(), json!(max_tokens));
        if let Some(system) = system {
            body.insert("system".into(), Value::String(system));
        }
        body.insert("messages".into(), Value::Array(messages));

        if !request.tools.is_empty() && request.tool_choice != ToolChoice::None {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body.insert("tools".into(), Value::Array(tools));
            body.insert("tool_choice".into(), wire_tool_choice(&request.tool_choice));
        }

        if let Some(effort) = request.reasoning_effort {
            body.insert(
                "thinking".into(),
                json!({
                    "type": "enabled",
                    "budget_tokens": effort.thinking_budget(max_tokens),
                }),
            );
        }

        Value::Object(body)
    }
}

#[async_trait::async_trait]
impl ChatClient for AnthropicClient {
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResult> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let body = self.build_body(request);
        debug!("Sending request to Anthropic: model={}", self.config.model);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.client.post(&url).json(&body).send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &text));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        info!("Anthropic response: model={}", self.config.model);
        parse_message(&payload)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

fn wire_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto | ToolChoice::None => json!({"type": "auto"}),
        ToolChoice::Required => json!({"type": "any"}),
        ToolChoice::Named(name) => json!({"type": "tool", "name": name}),
    }
}

/// Convert history into the Messages wire shape.
///
/// Returns the accumulated top-level system string and the message array.
/// Consecutive tool results collapse into one user message, keeping the
/// roles alternating the way the API expects.
fn wire_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system_parts: Vec<String> = Vec::new();
    let mut out: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    let flush_results = |pending: &mut Vec<Value>, out: &mut Vec<Value>| {
        if !pending.is_empty() {
            out.push(json!({
                "role": "user",
                "content": Value::Array(std::mem::take(pending)),
            }));
        }
    };

    for msg in messages {
        match msg.role {
            ChatRole::System => system_parts.push(msg.content.clone()),
            ChatRole::Tool => match &msg.tool_call_id {
                Some(id) => pending_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": msg.content,
                })),
                None => {
                    warn!("Tool message without tool_use_id degraded to user note");
                    flush_results(&mut pending_results, &mut out);
                    out.push(json!({
                        "role": "user",
                        "content": format!("[tool result] {}", msg.content),
                    }));
                }
            },
            ChatRole::User => {
                flush_results(&mut pending_results, &mut out);
                out.push(json!({"role": "user", "content": msg.content}));
            }
            ChatRole::Assistant => {
                flush_results(&mut pending_results, &mut out);
                // Raw block content from a previous completion round-trips
                // verbatim; otherwise blocks are rebuilt from the typed parts.
                let content = match &msg.raw_content {
                    Some(raw) => raw.clone(),
                    None => {
                        let mut blocks: Vec<Value> = Vec::new();
                        if !msg.content.is_empty() {
                            blocks.push(json!({"type": "text", "text": msg.content}));
                        }
                        if let Some(calls) = &msg.tool_calls {
                            for call in calls {
                                let input: Value = serde_json::from_str(&call.arguments)
                                    .unwrap_or(Value::Object(Map::new()));
                                blocks.push(json!({
                                    "type": "tool_use",
                                    "id": call.id,
                                    "name": call.name,
                                    "input": input,
                                }));
                            }
                        }
                        Value::Array(blocks)
                    }
                };
                out.push(json!({"role": "assistant", "content": content}));
            }
        }
    }
    flush_results(&mut pending_results, &mut out);

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, out)
}

/// Parse an Anthropic Messages response payload
fn parse_message(payload: &Value) -> Result<ChatResult> {
    let content = payload
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| Error::InvalidResponse("message has no content".into()))?;

    let mut result = ChatResult {
        model: payload
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string(),
        raw_content: Some(Value::Array(content.clone())),
        ..Default::default()
    };

    let mut text_parts = Vec::new();
    for block in content {
        match block.get("type").and_then(|t| t.as_str()).unwrap_or("") {
            "text" => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    text_parts.push(text.to_string());
                }
            }
            "tool_use" => {
                let input = block.get("input").cloned().unwrap_or(Value::Null);
                result.tool_calls.push(ChatToolCall {
                    id: block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    name: block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".into()),
                });
            }
            _ => {}
        }
    }
    if !text_parts.is_empty() {
        result.text = Some(text_parts.join(""));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ReasoningEffort;
    use secrecy::SecretString;

    fn test_config() -> AnthropicConfig {
        AnthropicConfig {
            api_key: SecretString::from("test-key"),
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            reasoning_effort: None,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_client_creation() {
        assert!(AnthropicClient::new(test_config()).is_ok());
    }

    #[test]
    fn test_system_lifted_to_top_level() {
        let (system, messages) = wire_messages(&[
            ChatMessage::system("You are an investigator."),
            ChatMessage::user("why did it crash?"),
        ]);
        assert_eq!(system.as_deref(), Some("You are an investigator."));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn test_tool_results_become_user_blocks() {
        let mut assistant = ChatMessage::assistant("");
        assistant.tool_calls = Some(vec![ChatToolCall {
            id: "tu_1".into(),
            name: "exec".into(),
            arguments: r#"{"command":"!pe"}"#.into(),
        }]);
        let (_, messages) = wire_messages(&[
            ChatMessage::user("go"),
            assistant,
            ChatMessage::tool("tu_1", "exception found"),
            ChatMessage::tool("tu_2", "second result"),
        ]);
        // Both results merge into one user message of tool_result blocks.
        assert_eq!(messages.len(), 3);
        let blocks = messages[2]["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "tool_result");
        assert_eq!(blocks[0]["tool_use_id"], "tu_1");
    }

    #[test]
    fn test_thinking_budget_in_body() {
        let client = AnthropicClient::new(test_config()).unwrap();
        let mut request = ChatRequest::from_messages(vec![ChatMessage::user("hi")]);
        request.max_tokens = Some(1024);
        request.reasoning_effort = Some(ReasoningEffort::High);
        let body = client.build_body(&request);
        assert_eq!(body["thinking"]["type"], "enabled");
        // 2048 clamped below max_tokens.
        assert_eq!(body["thinking"]["budget_tokens"], 1023);
    }

    #[test]
    fn test_parse_message_tool_use() {
        let payload = serde_json::json!({
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "Inspecting."},
                {"type": "tool_use", "id": "tu_9", "name": "inspect_object", "input": {"address": "0x1234"}}
            ],
            "stop_reason": "tool_use"
        });
        let result = parse_message(&payload).unwrap();
        assert_eq!(result.text.as_deref(), Some("Inspecting."));
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "inspect_object");
        assert!(result.tool_calls[0].arguments.contains("0x1234"));
    }
}
