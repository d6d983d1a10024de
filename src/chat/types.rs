//! Type definitions for the chat abstraction

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System message providing context and instructions
    System,
    /// User message
    User,
    /// Assistant (model) response
    Assistant,
    /// Tool result
    Tool,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
            ChatRole::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call emitted by the assistant
///
/// `arguments` is JSON text. IDs are stable within a single completion and
/// are the only link between a request and its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatToolCall {
    /// Unique ID for this tool call
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments as JSON text
    pub arguments: String,
}

/// A tool the model may call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTool {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for tool parameters, passed through unchanged
    pub parameters: Value,
}

/// Tool choice strategy
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// Let the model decide
    #[default]
    Auto,
    /// Never use tools
    None,
    /// The model must call some tool
    Required,
    /// Force a specific tool by name
    Named(String),
}

/// Reasoning effort hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    /// Normalize a textual effort value.
    ///
    /// Accepts `low | medium | high | unset | none`; `unset`, `none` and any
    /// unrecognized value clear the hint.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(ReasoningEffort::Low),
            "medium" => Some(ReasoningEffort::Medium),
            "high" => Some(ReasoningEffort::High),
            _ => None,
        }
    }

    /// Stable lowercase name used in cache paths and wire requests
    pub fn name(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }

    /// Anthropic thinking budget for this effort, clamped below `max_tokens`
    pub fn thinking_budget(&self, max_tokens: u32) -> u32 {
        let budget = match self {
            ReasoningEffort::Low => 512,
            ReasoningEffort::Medium => 1024,
            ReasoningEffort::High => 2048,
        };
        budget.min(max_tokens.saturating_sub(1))
    }
}

/// A message in a conversation
///
/// Beyond the text body a message can carry a structured payload: the raw
/// provider content preserved verbatim (`raw_content`) and an opaque map of
/// provider-specific fields that must be echoed on subsequent turns
/// (`provider_fields`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: ChatRole,
    /// Text body
    pub content: String,
    /// ID of the assistant tool call this message answers (tool role only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls emitted by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    /// Raw structured content preserved verbatim for provider round-trips
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<Value>,
    /// Provider-specific fields echoed back on subsequent turns
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_fields: Map<String, Value>,
}

impl ChatMessage {
    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
            raw_content: None,
            provider_fields: Map::new(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
            raw_content: None,
            provider_fields: Map::new(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
            raw_content: None,
            provider_fields: Map::new(),
        }
    }

    /// Create a new tool result message answering `tool_call_id`
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
            raw_content: None,
            provider_fields: Map::new(),
        }
    }
}

/// Request to a chat provider
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Messages in the conversation
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call
    pub tools: Vec<ChatTool>,
    /// Tool choice strategy
    pub tool_choice: ToolChoice,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Reasoning effort hint
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl ChatRequest {
    /// A request with only messages; tools empty, choice auto
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        ChatRequest {
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            max_tokens: None,
            reasoning_effort: None,
        }
    }
}

/// Result of a chat completion
#[derive(Debug, Clone, Default)]
pub struct ChatResult {
    /// Model that produced the completion
    pub model: String,
    /// Text content, if any
    pub text: Option<String>,
    /// Raw structured content preserved verbatim
    pub raw_content: Option<Value>,
    /// Provider-specific fields to echo on the next turn
    pub provider_fields: Map<String, Value>,
    /// Tool calls requested by the model
    pub tool_calls: Vec<ChatToolCall>,
}

impl ChatResult {
    /// The assistant message this completion contributes to history
    pub fn to_assistant_message(&self) -> ChatMessage {
        ChatMessage {
            role: ChatRole::Assistant,
            content: self.text.clone().unwrap_or_default(),
            tool_call_id: None,
            tool_calls: if self.tool_calls.is_empty() {
                None
            } else {
                Some(self.tool_calls.clone())
            },
            raw_content: self.raw_content.clone(),
            provider_fields: self.provider_fields.clone(),
        }
    }
}

/// One structured content block of a provider message
///
/// Unknown blocks preserve every field; known blocks keep fields we do not
/// model in an extension map so emission round-trips them.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    /// Plain text
    Text {
        text: String,
        extra: Map<String, Value>,
    },
    /// A tool invocation requested by the assistant
    ToolUse {
        id: String,
        name: String,
        input: Value,
        extra: Map<String, Value>,
    },
    /// A tool result answering a prior tool_use
    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: bool,
        extra: Map<String, Value>,
    },
    /// Anything we do not recognize, preserved verbatim
    Unknown(Map<String, Value>),
}

impl ContentBlock {
    /// Classify a raw JSON value into a content block
    pub fn from_value(value: &Value) -> ContentBlock {
        let obj = match value.as_object() {
            Some(o) => o,
            None => {
                // Non-object blocks degrade to text of their JSON rendering
                return ContentBlock::Text {
                    text: value_to_text(value),
                    extra: Map::new(),
                };
            }
        };

        let block_type = obj.get("type").and_then(|t| t.as_str()).unwrap_or("");
        match block_type {
            "text" => {
                let text = obj.get("text").and_then(|t| t.as_str()).unwrap_or_default();
                ContentBlock::Text {
                    text: text.to_string(),
                    extra: extra_fields(obj, &["type", "text"]),
                }
            }
            "tool_use" => ContentBlock::ToolUse {
                id: obj.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                name: obj
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                input: obj.get("input").cloned().unwrap_or(Value::Null),
                extra: extra_fields(obj, &["type", "id", "name", "input"]),
            },
            "tool_result" => ContentBlock::ToolResult {
                tool_use_id: obj
                    .get("tool_use_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                content: obj.get("content").cloned().unwrap_or(Value::Null),
                is_error: obj.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false),
                extra: extra_fields(obj, &["type", "tool_use_id", "content", "is_error"]),
            },
            _ => ContentBlock::Unknown(obj.clone()),
        }
    }

    /// Emit the block back to its wire shape
    pub fn to_value(&self) -> Value {
        match self {
            ContentBlock::Text { text, extra } => {
                let mut obj = Map::new();
                obj.insert("type".into(), Value::String("text".into()));
                obj.insert("text".into(), Value::String(text.clone()));
                obj.extend(extra.clone());
                Value::Object(obj)
            }
            ContentBlock::ToolUse { id, name, input, extra } => {
                let mut obj = Map::new();
                obj.insert("type".into(), Value::String("tool_use".into()));
                obj.insert("id".into(), Value::String(id.clone()));
                obj.insert("name".into(), Value::String(name.clone()));
                obj.insert("input".into(), input.clone());
                obj.extend(extra.clone());
                Value::Object(obj)
            }
            ContentBlock::ToolResult { tool_use_id, content, is_error, extra } => {
                let mut obj = Map::new();
                obj.insert("type".into(), Value::String("tool_result".into()));
                obj.insert("tool_use_id".into(), Value::String(tool_use_id.clone()));
                obj.insert("content".into(), content.clone());
                if *is_error {
                    obj.insert("is_error".into(), Value::Bool(true));
                }
                obj.extend(extra.clone());
                Value::Object(obj)
            }
            ContentBlock::Unknown(obj) => Value::Object(obj.clone()),
        }
    }
}

/// Render a JSON content value as display text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn extra_fields(obj: &Map<String, Value>, known: &[&str]) -> Map<String, Value> {
    obj.iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
