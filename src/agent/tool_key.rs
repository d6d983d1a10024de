//! Stable tool keys
//!
//! A tool key is a canonical string derived from a tool name and its
//! arguments, equal across whitespace, casing and JSON key-order variations
//! of the same call. Keys feed the evidence ledger's deduplication and the
//! checkpoint's `doNotRepeat` list.

use serde_json::Value;

/// Canonicalize JSON text: object keys sorted ordinal-ascending recursively,
/// whitespace elided. Unparsable input falls back to the trimmed text.
pub fn canonical_json(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            let mut out = String::with_capacity(text.len());
            write_canonical(&value, &mut out);
            out
        }
        Err(_) => text.trim().to_string(),
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string serializes"));
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Collapse runs of whitespace to single spaces, trim, lowercase.
fn normalize_command(command: &str) -> String {
    command
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn string_arg(arguments_json: &str, field: &str) -> Option<String> {
    serde_json::from_str::<Value>(arguments_json)
        .ok()?
        .get(field)?
        .as_str()
        .map(|s| s.to_string())
}

/// Derive the stable key for a tool call.
///
/// `exec` keys on its normalized command, `analyze` on its lowercased kind,
/// everything else on the lowercased tool name plus canonical arguments.
pub fn tool_key(tool_name: &str, arguments_json: &str) -> String {
    let name = tool_name.to_lowercase();
    match name.as_str() {
        "exec" => {
            let command = string_arg(arguments_json, "command").unwrap_or_default();
            format!("exec:{}", normalize_command(&command))
        }
        "analyze" => {
            let kind = string_arg(arguments_json, "kind").unwrap_or_default();
            format!("analyze:{}", kind.trim().to_lowercase())
        }
        _ => format!("{}:{}", name, canonical_json(arguments_json)),
    }
}
