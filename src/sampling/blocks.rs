//! Embedded tool-use extraction
//!
//! Some providers emit `tool_use` objects inline in assistant text instead
//! of structured tool calls. A balanced-brace scanner with explicit
//! string-literal handling pulls them out; the extracted ranges are removed
//! from the displayed text. No regex: brace balance inside string literals
//! would defeat it.

use serde_json::Value;

use crate::chat::ChatToolCall;

/// Find the end (exclusive byte index) of the balanced JSON object starting
/// at `start`, where `text[start]` is `{`. Returns `None` when the input
/// ends before the object closes.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    debug_assert_eq!(bytes.get(start), Some(&b'{'));

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else {
                match byte {
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn tool_use_from_value(value: &Value) -> Option<ChatToolCall> {
    let obj = value.as_object()?;
    if obj.get("type").and_then(|t| t.as_str()) != Some("tool_use") {
        return None;
    }
    let name = obj.get("name").and_then(|n| n.as_str())?;
    let id = obj.get("id").and_then(|i| i.as_str()).unwrap_or_default();
    let input = obj.get("input").cloned().unwrap_or(Value::Null);
    Some(ChatToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".into()),
    })
}

/// Extract every embedded `tool_use` object from `text`.
///
/// Returns the display text with the extracted ranges removed, plus the
/// parsed tool calls in order of appearance.
pub fn extract_embedded_tool_uses(text: &str) -> (String, Vec<ChatToolCall>) {
    let mut calls = Vec::new();
    let mut cleaned = String::with_capacity(text.len());
    let mut cursor = 0usize;

    while let Some(relative) = text[cursor..].find('{') {
        let brace = cursor + relative;
        cleaned.push_str(&text[cursor..brace]);

        match balanced_object_end(text, brace) {
            Some(end) => {
                let candidate = &text[brace..end];
                let parsed = serde_json::from_str::<Value>(candidate)
                    .ok()
                    .and_then(|v| tool_use_from_value(&v));
                match parsed {
                    Some(call) => {
                        calls.push(call);
                        cursor = end;
                    }
                    None => {
                        // Not a tool_use object: keep the brace and move on.
                        cleaned.push('{');
                        cursor = brace + 1;
                    }
                }
            }
            None => {
                // Unbalanced to end of input.
                cleaned.push_str(&text[brace..]);
                cursor = text.len();
            }
        }
    }
    cleaned.push_str(&text[cursor..]);

    (cleaned, calls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_objects_is_identity() {
        let (text, calls) = extract_embedded_tool_uses("just plain prose");
        assert_eq!(text, "just plain prose");
        assert!(calls.is_empty());
    }

    #[test]
    fn test_single_embedded_tool_use() {
        let input = r#"Let me check. {"type": "tool_use", "id": "tu_1", "name": "exec", "input": {"command": "!pe"}} Done."#;
        let (text, calls) = extract_embedded_tool_uses(input);
        assert_eq!(text, "Let me check.  Done.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "exec");
        assert!(calls[0].arguments.contains("!pe"));
    }

    #[test]
    fn test_braces_inside_strings_do_not_break_balance() {
        let input = r#"{"type": "tool_use", "name": "exec", "input": {"command": "print {x} }"}}"#;
        let (text, calls) = extract_embedded_tool_uses(input);
        assert_eq!(text, "");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments.contains("print {x} }"));
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let input = r#"{"type": "tool_use", "name": "exec", "input": {"command": "say \"hi\" {"}}"#;
        let (_, calls) = extract_embedded_tool_uses(input);
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn test_non_tool_use_objects_kept_in_text() {
        let input = r#"The result was {"status": "ok"} overall."#;
        let (text, calls) = extract_embedded_tool_uses(input);
        assert_eq!(text, input);
        assert!(calls.is_empty());
    }

    #[test]
    fn test_mixed_objects() {
        let input = r#"Data {"a": 1} then {"type": "tool_use", "name": "analyze", "input": {"kind": "crash"}} end"#;
        let (text, calls) = extract_embedded_tool_uses(input);
        assert_eq!(text, r#"Data {"a": 1} then  end"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "analyze");
    }

    #[test]
    fn test_unbalanced_tail_preserved() {
        let input = r#"starts { "never": "closes"#;
        let (text, calls) = extract_embedded_tool_uses(input);
        assert_eq!(text, input);
        assert!(calls.is_empty());
    }

    #[test]
    fn test_multiple_tool_uses_in_order() {
        let input = concat!(
            r#"{"type":"tool_use","name":"report_index","input":{}}"#,
            " and ",
            r#"{"type":"tool_use","name":"exec","input":{"command":"!threads"}}"#,
        );
        let (text, calls) = extract_embedded_tool_uses(input);
        assert_eq!(text, " and ");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "report_index");
        assert_eq!(calls[1].name, "exec");
    }
}
