//! sampling/createMessage translation
//!
//! The request side accepts the looser MCP shapes (string or block-array
//! content, string or object tool choice, either spelling of the reasoning
//! effort) and normalizes them onto `ChatRequest`. The response side
//! re-assembles content blocks, preserving unknown provider fields.

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::blocks::extract_embedded_tool_uses;
use crate::chat::{
    value_to_text, ChatClient, ChatMessage, ChatRequest, ChatResult, ChatTool, ContentBlock,
    ReasoningEffort, ToolChoice,
};
use crate::error::{Error, Result};

/// Receives one-line progress notifications during translation
pub trait ProgressSink: Send + Sync {
    fn notify(&self, line: &str);
}

/// Sink that drops all notifications
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn notify(&self, _line: &str) {}
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if out.len() < text.len() {
        out.push('…');
    }
    out
}

/// Parse `sampling/createMessage` params into a chat request.
///
/// Emits one progress line per tool result observed in the incoming message
/// stream.
pub fn parse_create_message(params: &Value, progress: &dyn ProgressSink) -> Result<ChatRequest> {
    let mut messages: Vec<ChatMessage> = Vec::new();

    if let Some(system) = params.get("systemPrompt").and_then(|s| s.as_str()) {
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
    }

    let incoming = params
        .get("messages")
        .and_then(|m| m.as_array())
        .ok_or_else(|| Error::InvalidInput("sampling request has no messages".into()))?;

    for message in incoming {
        let role = message.get("role").and_then(|r| r.as_str()).unwrap_or("user");
        let content = message.get("content").cloned().unwrap_or(Value::Null);
        append_message(&mut messages, role, &content, progress);
    }

    let tools = params
        .get("tools")
        .and_then(|t| t.as_array())
        .map(|list| list.iter().filter_map(parse_tool).collect())
        .unwrap_or_default();

    let tool_choice = params
        .get("toolChoice")
        .map(parse_tool_choice)
        .unwrap_or_default();

    let max_tokens = params
        .get("maxTokens")
        .and_then(|m| m.as_u64())
        .map(|m| m as u32);

    // reasoningEffort as a string, or the nested {reasoning: {effort}} form.
    let reasoning_effort = params
        .get("reasoningEffort")
        .and_then(|e| e.as_str())
        .or_else(|| {
            params
                .get("reasoning")
                .and_then(|r| r.get("effort"))
                .and_then(|e| e.as_str())
        })
        .and_then(ReasoningEffort::parse);

    Ok(ChatRequest { messages, tools, tool_choice, max_tokens, reasoning_effort })
}

/// Normalize one incoming message, splitting out tool results.
fn append_message(
    messages: &mut Vec<ChatMessage>,
    role: &str,
    content: &Value,
    progress: &dyn ProgressSink,
) {
    let blocks: Vec<ContentBlock> = match content {
        Value::Array(items) => items.iter().map(ContentBlock::from_value).collect(),
        Value::String(text) => vec![ContentBlock::Text { text: text.clone(), extra: Map::new() }],
        Value::Object(_) => vec![ContentBlock::from_value(content)],
        _ => vec![],
    };

    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_results: Vec<ChatMessage> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text, .. } => text_parts.push(text),
            ContentBlock::ToolUse { id, name, input, .. } => {
                tool_calls.push(crate::chat::ChatToolCall {
                    id,
                    name,
                    arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".into()),
                });
            }
            ContentBlock::ToolResult { tool_use_id, content, .. } => {
                let text = value_to_text(&content);
                progress.notify(&format!(
                    "tool_result {}: {}",
                    tool_use_id,
                    preview(&text, 80)
                ));
                tool_results.push(ChatMessage::tool(tool_use_id, text));
            }
            ContentBlock::Unknown(obj) => {
                // Unknown blocks surface as their JSON so nothing is lost.
                text_parts.push(Value::Object(obj).to_string());
            }
        }
    }

    let text = text_parts.join("");
    match role {
        "assistant" => {
            let mut msg = ChatMessage::assistant(text);
            if !tool_calls.is_empty() {
                msg.tool_calls = Some(tool_calls);
            }
            if let Value::Array(raw) = content {
                msg.raw_content = Some(Value::Array(raw.clone()));
            }
            messages.push(msg);
        }
        _ => {
            if !text.is_empty() || tool_results.is_empty() {
                messages.push(ChatMessage::user(text));
            }
            messages.extend(tool_results);
        }
    }
}

fn parse_tool(value: &Value) -> Option<ChatTool> {
    let name = value.get("name")?.as_str()?.to_string();
    let description = value
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_string();
    let parameters = value
        .get("inputSchema")
        .or_else(|| value.get("input_schema"))
        .or_else(|| value.get("parameters"))
        .cloned()
        .unwrap_or_else(|| json!({"type": "object"}));
    Some(ChatTool { name, description, parameters })
}

fn parse_tool_choice(value: &Value) -> ToolChoice {
    match value {
        Value::String(s) => match s.as_str() {
            "none" => ToolChoice::None,
            "required" | "any" => ToolChoice::Required,
            _ => ToolChoice::Auto,
        },
        Value::Object(obj) => {
            // {type:"tool", name} and {type:"function", function:{name}}
            if let Some(name) = obj.get("name").and_then(|n| n.as_str()) {
                return ToolChoice::Named(name.to_string());
            }
            if let Some(name) = obj
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|n| n.as_str())
            {
                return ToolChoice::Named(name.to_string());
            }
            ToolChoice::Auto
        }
        _ => ToolChoice::Auto,
    }
}

/// Emit the completion back in `sampling/createMessage` response shape.
///
/// Emits one progress line per tool call the completion requested.
pub fn emit_create_message_result(result: &ChatResult, progress: &dyn ProgressSink) -> Value {
    // Fallback: tool_use objects embedded in plain text become real calls.
    let (display_text, mut tool_calls) = match (result.tool_calls.is_empty(), &result.text) {
        (true, Some(text)) => {
            let (cleaned, extracted) = extract_embedded_tool_uses(text);
            (Some(cleaned), extracted)
        }
        _ => (result.text.clone(), Vec::new()),
    };
    if tool_calls.is_empty() {
        tool_calls = result.tool_calls.clone();
    }

    let mut content: Vec<Value> = Vec::new();

    // Raw provider blocks round-trip with their unknown fields intact.
    if let Some(Value::Array(raw)) = &result.raw_content {
        for block in raw {
            content.push(ContentBlock::from_value(block).to_value());
        }
    } else {
        if let Some(text) = &display_text {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                content.push(json!({"type": "text", "text": trimmed}));
            }
        }
        for call in &tool_calls {
            let input: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
            content.push(json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": input,
            }));
        }
    }

    for call in &tool_calls {
        progress.notify(&format!("tool_use {}: {}", call.name, preview(&call.arguments, 80)));
    }

    json!({
        "role": "assistant",
        "model": result.model,
        "content": content,
    })
}

/// Full round trip: parse, complete, emit.
pub async fn handle_create_message(
    params: &Value,
    client: &dyn ChatClient,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<Value> {
    let request = parse_create_message(params, progress)?;
    debug!(
        "Sampling request: {} messages, {} tools",
        request.messages.len(),
        request.tools.len()
    );
    let result = client.complete(&request, cancel).await?;
    Ok(emit_create_message_result(&result, progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRole;
    use std::sync::Mutex;

    struct CollectingSink(Mutex<Vec<String>>);

    impl CollectingSink {
        fn new() -> Self {
            CollectingSink(Mutex::new(Vec::new()))
        }
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ProgressSink for CollectingSink {
        fn notify(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    #[test]
    fn test_parse_string_content() {
        let params = json!({
            "systemPrompt": "You investigate crashes.",
            "messages": [{"role": "user", "content": "why did it crash?"}],
            "maxTokens": 2048,
        });
        let request = parse_create_message(&params, &NullProgressSink).unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, ChatRole::System);
        assert_eq!(request.messages[1].content, "why did it crash?");
        assert_eq!(request.max_tokens, Some(2048));
    }

    #[test]
    fn test_parse_block_content_with_tool_result() {
        let sink = CollectingSink::new();
        let params = json!({
            "messages": [
                {"role": "assistant", "content": [
                    {"type": "text", "text": "Running."},
                    {"type": "tool_use", "id": "tu_1", "name": "exec", "input": {"command": "!pe"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "tu_1", "content": "exception details"}
                ]}
            ]
        });
        let request = parse_create_message(&params, &sink).unwrap();
        assert_eq!(request.messages.len(), 2);

        let assistant = &request.messages[0];
        assert_eq!(assistant.role, ChatRole::Assistant);
        assert_eq!(assistant.tool_calls.as_ref().unwrap().len(), 1);
        assert!(assistant.raw_content.is_some());

        let tool = &request.messages[1];
        assert_eq!(tool.role, ChatRole::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("tu_1"));

        // One compact progress line for the observed result.
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("tool_result tu_1:"));
    }

    #[test]
    fn test_parse_tool_choice_shapes() {
        assert_eq!(parse_tool_choice(&json!("auto")), ToolChoice::Auto);
        assert_eq!(parse_tool_choice(&json!("none")), ToolChoice::None);
        assert_eq!(parse_tool_choice(&json!("required")), ToolChoice::Required);
        assert_eq!(
            parse_tool_choice(&json!({"type": "tool", "name": "exec"})),
            ToolChoice::Named("exec".into())
        );
        assert_eq!(
            parse_tool_choice(&json!({"type": "function", "function": {"name": "analyze"}})),
            ToolChoice::Named("analyze".into())
        );
    }

    #[test]
    fn test_reasoning_effort_both_spellings() {
        let flat = json!({"messages": [], "reasoningEffort": "high"});
        assert_eq!(
            parse_create_message(&flat, &NullProgressSink).unwrap().reasoning_effort,
            Some(ReasoningEffort::High)
        );
        let nested = json!({"messages": [], "reasoning": {"effort": "low"}});
        assert_eq!(
            parse_create_message(&nested, &NullProgressSink).unwrap().reasoning_effort,
            Some(ReasoningEffort::Low)
        );
        let cleared = json!({"messages": [], "reasoningEffort": "none"});
        assert_eq!(
            parse_create_message(&cleared, &NullProgressSink).unwrap().reasoning_effort,
            None
        );
    }

    #[test]
    fn test_emit_structured_tool_calls() {
        let sink = CollectingSink::new();
        let result = ChatResult {
            model: "m1".into(),
            text: Some("Checking".into()),
            raw_content: None,
            provider_fields: Map::new(),
            tool_calls: vec![crate::chat::ChatToolCall {
                id: "c1".into(),
                name: "clr_stack".into(),
                arguments: r#"{"threadId":3}"#.into(),
            }],
        };
        let emitted = emit_create_message_result(&result, &sink);
        assert_eq!(emitted["role"], "assistant");
        let content = emitted["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "tool_use");
        assert_eq!(content[1]["input"]["threadId"], 3);

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("tool_use clr_stack:"));
    }

    #[test]
    fn test_emit_fallback_extraction_from_text() {
        let result = ChatResult {
            model: "m1".into(),
            text: Some(
                r#"I will inspect. {"type":"tool_use","id":"tu_9","name":"inspect_object","input":{"address":"0xabc"}}"#.into(),
            ),
            raw_content: None,
            provider_fields: Map::new(),
            tool_calls: vec![],
        };
        let emitted = emit_create_message_result(&result, &NullProgressSink);
        let content = emitted["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "I will inspect.");
        assert_eq!(content[1]["type"], "tool_use");
        assert_eq!(content[1]["name"], "inspect_object");
    }

    #[test]
    fn test_emit_preserves_unknown_block_fields() {
        let result = ChatResult {
            model: "m1".into(),
            text: Some("t".into()),
            raw_content: Some(json!([
                {"type": "text", "text": "t", "citations": ["a"]}
            ])),
            provider_fields: Map::new(),
            tool_calls: vec![],
        };
        let emitted = emit_create_message_result(&result, &NullProgressSink);
        assert_eq!(emitted["content"][0]["citations"][0], "a");
    }
}
