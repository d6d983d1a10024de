//! Tool executor trait, built-in definitions, and error classification

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatTool;
use crate::error::Result;

/// A tool-execution function the runner can drive.
///
/// Results are opaque UTF-8; contract errors come back as `Ok` strings and
/// are classified by [`is_error_result`], not raised as errors.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tool definitions advertised to the model
    fn definitions(&self) -> Vec<ChatTool>;

    /// Execute one tool call
    async fn execute(
        &self,
        name: &str,
        arguments_json: &str,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Definitions for the full tool surface: the six remote debugger tools plus
/// the two local report-navigation tools.
pub fn builtin_tool_definitions() -> Vec<ChatTool> {
    vec![
        ChatTool {
            name: "report_index".into(),
            description: "Return a small index (summary and table of contents) for the opened dump."
                .into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ChatTool {
            name: "report_get".into(),
            description: "Fetch a report section by dot-path. Objects are pageable with pageKind=object; rows can be filtered with where; maxChars guards oversized answers.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Dot-path of the section, e.g. analysis.threads.all"},
                    "limit": {"type": "integer"},
                    "cursor": {"type": "string"},
                    "pageKind": {"type": "string", "enum": ["object"]},
                    "select": {"type": "array", "items": {"type": "string"}},
                    "where": {
                        "type": "object",
                        "properties": {
                            "field": {"type": "string"},
                            "equals": {"type": "string"},
                            "caseInsensitive": {"type": "boolean"}
                        }
                    },
                    "maxChars": {"type": "integer"}
                },
                "required": ["path"]
            }),
        },
        ChatTool {
            name: "exec".into(),
            description: "Run a debugger command.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"]
            }),
        },
        ChatTool {
            name: "analyze".into(),
            description: "Run an automated analysis of the given kind.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "kind": {
                        "type": "string",
                        "enum": ["crash", "performance", "cpu", "allocations", "gc", "contention", "security"]
                    }
                },
                "required": ["kind"]
            }),
        },
        ChatTool {
            name: "inspect_object".into(),
            description: "Inspect the object at an address.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "address": {"type": "string"},
                    "maxDepth": {"type": "integer"}
                },
                "required": ["address"]
            }),
        },
        ChatTool {
            name: "clr_stack".into(),
            description: "Show the managed stack for a thread.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "threadId": {"type": "integer"},
                    "includeArguments": {"type": "boolean"},
                    "includeLocals": {"type": "boolean"},
                    "includeRegisters": {"type": "boolean"}
                }
            }),
        },
        ChatTool {
            name: "find_report_sections".into(),
            description: "Search cached report sections by keyword.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        },
        ChatTool {
            name: "get_report_section".into(),
            description: "Fetch one cached report section by id or JSON pointer.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "sectionId": {"type": "string"},
                    "jsonPointer": {"type": "string"},
                    "report": {"type": "string"}
                }
            }),
        },
    ]
}

const ERROR_PREFIXES: &[&str] = &["ERROR:", "invalid_path:", "invalid_cursor:", "too_large"];

/// Classify a tool result as an error signal.
///
/// Recognized shapes: the fixed error prefixes, a JSON `{error:{code}}`
/// object, and the `<field.path> is required.` schema-contract message.
pub fn is_error_result(output: &str) -> bool {
    let trimmed = output.trim();
    if ERROR_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return true;
    }

    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if value.get("error").map(|e| e.get("code").is_some()).unwrap_or(false) {
                return true;
            }
        }
    }

    // "<field.path> is required." on a single line
    if let Some(field) = trimmed.strip_suffix(" is required.") {
        if !field.is_empty() && !field.contains(char::is_whitespace) {
            return true;
        }
    }

    false
}
