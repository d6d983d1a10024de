//! Agent trace store
//!
//! Appends JSONL events and per-request body files under
//! `$CONFIG/llmagent-trace/<timestamp>-<label>-<uuid>/`. Each event is one
//! serialized line appended to `events.jsonl`; the file is opened in append
//! mode per write, so nothing holds a handle across suspensions. Writes are
//! best-effort: a full disk or a read-only directory must never take the
//! agent loop down, so every failure is swallowed after a warning.

use chrono::Utc;
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::redact::redact_agent_trace;

/// Byte cap on a persisted request/response body
const MAX_BODY_BYTES: usize = 2_000_000;

/// One trace directory with an events stream
pub struct TraceStore {
    dir: PathBuf,
    /// Serializes appends from concurrent handlers; flips to false for the
    /// rest of the run once a write fails.
    enabled: Mutex<bool>,
}

impl TraceStore {
    /// Create a trace directory under `root` for one labeled run.
    ///
    /// Returns a store even when the directory cannot be created; it then
    /// drops everything written to it.
    pub fn create(root: &Path, label: &str) -> Self {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let dir = root.join(format!("{}-{}-{}", stamp, sanitize_label(label), Uuid::new_v4()));

        let enabled = std::fs::create_dir_all(&dir)
            .map_err(|e| warn!("Trace store disabled: {}", e))
            .is_ok();

        TraceStore { dir, enabled: Mutex::new(enabled) }
    }

    /// The trace directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one event line. Failures are swallowed.
    pub fn append_event(&self, kind: &str, payload: Value) {
        let line = json!({
            "ts": Utc::now().to_rfc3339(),
            "kind": kind,
            "data": payload,
        });
        let redacted = redact_agent_trace(&line.to_string());

        let mut enabled = self.enabled.lock().expect("trace lock");
        if !*enabled {
            return;
        }
        if let Err(e) = append_line(&self.dir.join("events.jsonl"), &redacted) {
            warn!("Trace event write failed: {}", e);
            // Stop trying for the rest of the run.
            *enabled = false;
        }
    }

    /// Write one request/response body file, size-capped and redacted.
    /// Failures are swallowed.
    pub fn write_body(&self, name: &str, content: &str) {
        let capped = crate::chat::util::utf8_safe_prefix(content, MAX_BODY_BYTES);
        let redacted = redact_agent_trace(capped);
        let path = self.dir.join(format!("{}.json", sanitize_label(name)));
        if let Err(e) = std::fs::write(&path, redacted) {
            warn!("Trace body write failed for {}: {}", path.display(), e);
        }
    }
}

/// Append one line to a *.jsonl file, creating it on first use.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
        .take(60)
        .collect()
}
