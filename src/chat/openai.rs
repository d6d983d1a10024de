//! OpenAI-style chat/completions client
//!
//! Also hosts the OpenAI wire helpers shared with the OpenRouter client:
//! message/tool serialization and completion parsing.

use reqwest::{header, Client};
use secrecy::ExposeSecret;
use serde_json::{json, Map, Value};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::ChatClient;
use super::types::{ChatMessage, ChatRequest, ChatResult, ChatRole, ChatToolCall, ToolChoice};
use super::util::cap_error_body;
use crate::config::OpenAiConfig;
use crate::error::{Error, Result};

/// Which token-cap field the model accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenParam {
    MaxTokens,
    MaxCompletionTokens,
}

impl TokenParam {
    pub(crate) fn field(self) -> &'static str {
        match self {
            TokenParam::MaxTokens => "max_tokens",
            TokenParam::MaxCompletionTokens => "max_completion_tokens",
        }
    }

    pub(crate) fn other(self) -> Self {
        match self {
            TokenParam::MaxTokens => TokenParam::MaxCompletionTokens,
            TokenParam::MaxCompletionTokens => TokenParam::MaxTokens,
        }
    }
}

/// True when `body` is a 400-style complaint that `param` is unsupported.
///
/// `max_tokens` is a substring of `max_completion_tokens`, so the check for
/// the shorter name first elides the longer one from the body.
pub(crate) fn body_rejects_token_param(body: &str, param: TokenParam) -> bool {
    let lower = body.to_ascii_lowercase();
    if !lower.contains("unsupported parameter") {
        return false;
    }
    match param {
        TokenParam::MaxCompletionTokens => lower.contains("max_completion_tokens"),
        TokenParam::MaxTokens => lower.replace("max_completion_tokens", "").contains("max_tokens"),
    }
}

/// OpenAI API client
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
    /// Learned token-cap field; flipped by the adaptive retry
    token_param: Mutex<TokenParam>,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!(
            "Bearer {}",
            config.api_key.expose_secret()
        ))
        .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(OpenAiClient {
            client,
            config,
            token_param: Mutex::new(TokenParam::MaxTokens),
        })
    }

    fn build_body(&self, request: &ChatRequest, token_param: TokenParam) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), Value::String(self.config.model.clone()));
        body.insert("messages".into(), Value::Array(wire_messages(&request.messages)));
        if !request.tools.is_empty() && request.tool_choice != ToolChoice::None {
            body.insert("tools".into(), wire_tools(request));
            body.insert("tool_choice".into(), wire_tool_choice(&request.tool_choice));
        }
        if let Some(max) = request.max_tokens {
            body.insert(token_param.field().into(), json!(max));
        }
        if let Some(effort) = request.reasoning_effort {
            body.insert("reasoning_effort".into(), Value::String(effort.name().into()));
        }
        Value::Object(body)
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResult> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut token_param = *self.token_param.lock().expect("token param lock");
        let mut retried = false;

        loop {
            let body = self.build_body(request, token_param);
            debug!("Sending request to OpenAI: model={}", self.config.model);

            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = self.client.post(&url).json(&body).send() => result?,
            };

            let status = response.status();
            if status.is_success() {
                let payload: Value = response
                    .json()
                    .await
                    .map_err(|e| Error::InvalidResponse(e.to_string()))?;
                info!("OpenAI response: model={}", self.config.model);
                return parse_completion(&payload, false);
            }

            let text = response.text().await.unwrap_or_default();

            // A single adaptive retry switches the token-cap field when the
            // server rejects the one we used.
            if status.as_u16() == 400
                && !retried
                && request.max_tokens.is_some()
                && body_rejects_token_param(&text, token_param)
            {
                let switched = token_param.other();
                warn!(
                    "Server rejected {}, retrying once with {}",
                    token_param.field(),
                    switched.field()
                );
                token_param = switched;
                *self.token_param.lock().expect("token param lock") = switched;
                retried = true;
                continue;
            }

            return Err(classify_http_error(status.as_u16(), &text));
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Map a non-2xx provider answer onto the error taxonomy
pub(crate) fn classify_http_error(status: u16, body: &str) -> Error {
    let capped = cap_error_body(body);
    match status {
        429 => Error::RateLimit(capped),
        401 => Error::Unauthorized("Invalid API key".to_string()),
        _ => Error::Provider { status, body: capped },
    }
}

/// Serialize messages onto the OpenAI wire.
///
/// A tool message without the id of the assistant call it answers violates
/// the wire contract; it degrades to a user note instead of being dropped
/// silently.
pub(crate) fn wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg.role {
            ChatRole::System | ChatRole::User => {
                out.push(json!({
                    "role": msg.role.to_string(),
                    "content": msg.content,
                }));
            }
            ChatRole::Tool => match &msg.tool_call_id {
                Some(id) => out.push(json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": msg.content,
                })),
                None => {
                    warn!("Tool message without tool_call_id degraded to user note");
                    out.push(json!({
                        "role": "user",
                        "content": format!("[tool result] {}", msg.content),
                    }));
                }
            },
            ChatRole::Assistant => {
                let mut obj = Map::new();
                obj.insert("role".into(), Value::String("assistant".into()));
                // Raw provider content round-trips verbatim when present.
                let content = match &msg.raw_content {
                    Some(raw) => raw.clone(),
                    None if msg.content.is_empty() && msg.tool_calls.is_some() => Value::Null,
                    None => Value::String(msg.content.clone()),
                };
                obj.insert("content".into(), content);
                if let Some(calls) = &msg.tool_calls {
                    if !calls.is_empty() {
                        let wire: Vec<Value> = calls
                            .iter()
                            .map(|c| {
                                json!({
                                    "id": c.id,
                                    "type": "function",
                                    "function": {"name": c.name, "arguments": c.arguments},
                                })
                            })
                            .collect();
                        obj.insert("tool_calls".into(), Value::Array(wire));
                    }
                }
                // Echo provider-specific fields without re-typing them.
                for (key, value) in &msg.provider_fields {
                    obj.entry(key.clone()).or_insert_with(|| value.clone());
                }
                out.push(Value::Object(obj));
            }
        }
    }
    out
}

pub(crate) fn wire_tools(request: &ChatRequest) -> Value {
    Value::Array(
        request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
                })
            })
            .collect(),
    )
}

pub(crate) fn wire_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::String("auto".into()),
        ToolChoice::None => Value::String("none".into()),
        ToolChoice::Required => Value::String("required".into()),
        ToolChoice::Named(name) => json!({
            "type": "function",
            "function": {"name": name},
        }),
    }
}

/// Parse an OpenAI-shaped completion payload.
///
/// With `lift_content_blocks` set (OpenRouter), tool-use blocks embedded in
/// an assistant content array are recognized as tool calls; array content is
/// preserved verbatim and single-object content is wrapped into a singleton
/// array first.
pub(crate) fn parse_completion(payload: &Value, lift_content_blocks: bool) -> Result<ChatResult> {
    let model = payload
        .get("model")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();

    let message = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.as_object())
        .ok_or_else(|| Error::InvalidResponse("completion has no choices".into()))?;

    let mut result = ChatResult {
        model,
        ..Default::default()
    };

    match message.get("content") {
        Some(Value::String(text)) => {
            if !text.is_empty() {
                result.text = Some(text.clone());
            }
        }
        Some(Value::Array(blocks)) => {
            result.raw_content = Some(Value::Array(blocks.clone()));
            collect_block_content(blocks, lift_content_blocks, &mut result);
        }
        Some(Value::Object(single)) => {
            // Some providers emit a bare block; normalize to a singleton array.
            let blocks = vec![Value::Object(single.clone())];
            result.raw_content = Some(Value::Array(blocks.clone()));
            collect_block_content(&blocks, lift_content_blocks, &mut result);
        }
        _ => {}
    }

    if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
        for call in calls {
            let id = call.get("id").and_then(|v| v.as_str()).unwrap_or_default();
            let function = call.get("function");
            let name = function
                .and_then(|f| f.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let arguments = function
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
                .unwrap_or("{}");
            result.tool_calls.push(ChatToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            });
        }
    }

    // Unknown assistant fields are preserved and echoed on later turns.
    for (key, value) in message {
        if !matches!(key.as_str(), "role" | "content" | "tool_calls") {
            result.provider_fields.insert(key.clone(), value.clone());
        }
    }

    Ok(result)
}

fn collect_block_content(blocks: &[Value], lift_tool_use: bool, result: &mut ChatResult) {
    let mut text_parts = Vec::new();
    for block in blocks {
        let block_type = block.get("type").and_then(|t| t.as_str()).unwrap_or("");
        match block_type {
            "text" => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    text_parts.push(text.to_string());
                }
            }
            "tool_use" if lift_tool_use => {
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
}
