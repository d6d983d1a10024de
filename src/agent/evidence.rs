//! Evidence ledger
//!
//! Append-only, content-addressed record of tool executions. Entries carry a
//! monotonic `E1, E2, ...` id that stays valid across context pruning, which
//! is what lets a checkpoint refer to prior findings after history is gone.
//!
//! The ledger is memory, not a cache: every tool call the model requests is
//! executed; an identical `(tool key, output)` pair only bumps `seen_count`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

use crate::chat::util::utf8_safe_prefix;

/// Byte cap on the stored preview of a tool result
const PREVIEW_BYTES: usize = 400;

/// Evidence tags (fixed vocabulary)
pub mod tags {
    pub const ORIENT_REPORT_INDEX: &str = "ORIENT_REPORT_INDEX";
    pub const BASELINE_META: &str = "BASELINE_META";
    pub const BASELINE_SUMMARY: &str = "BASELINE_SUMMARY";
    pub const BASELINE_ENV: &str = "BASELINE_ENV";
    pub const BASELINE_EXC_TYPE: &str = "BASELINE_EXC_TYPE";
    pub const BASELINE_EXC_MESSAGE: &str = "BASELINE_EXC_MESSAGE";
    pub const BASELINE_EXC_HRESULT: &str = "BASELINE_EXC_HRESULT";
    pub const BASELINE_EXC_STACKTRACE: &str = "BASELINE_EXC_STACKTRACE";
    pub const BASELINE_EXC_ANALYSIS: &str = "BASELINE_EXC_ANALYSIS";
    pub const REPORT_GET: &str = "REPORT_GET";
    pub const EXEC: &str = "EXEC";
    pub const ATTACHED_REPORT: &str = "ATTACHED_REPORT";
}

/// Map a tool call onto its normalized tag set
pub fn tags_for(tool_name: &str, arguments_json: &str) -> Vec<String> {
    let name = tool_name.to_lowercase();
    let args: serde_json::Value = serde_json::from_str(arguments_json).unwrap_or_default();
    let path = args.get("path").and_then(|p| p.as_str()).unwrap_or("");

    let tag = match name.as_str() {
        "report_index" => tags::ORIENT_REPORT_INDEX.to_string(),
        "report_get" => match path {
            "metadata" => tags::BASELINE_META.to_string(),
            "analysis.summary" => tags::BASELINE_SUMMARY.to_string(),
            "analysis.environment" => tags::BASELINE_ENV.to_string(),
            "analysis.exception.type" => tags::BASELINE_EXC_TYPE.to_string(),
            "analysis.exception.message" => tags::BASELINE_EXC_MESSAGE.to_string(),
            "analysis.exception.hResult" => tags::BASELINE_EXC_HRESULT.to_string(),
            "analysis.exception.stackTrace" => tags::BASELINE_EXC_STACKTRACE.to_string(),
            "analysis.exception.analysis" => tags::BASELINE_EXC_ANALYSIS.to_string(),
            _ => tags::REPORT_GET.to_string(),
        },
        "exec" => tags::EXEC.to_string(),
        "analyze" => {
            let kind = args.get("kind").and_then(|k| k.as_str()).unwrap_or("");
            format!("ANALYZE:{}", kind.to_lowercase())
        }
        "find_report_sections" | "get_report_section" => tags::ATTACHED_REPORT.to_string(),
        _ => name.to_uppercase(),
    };
    vec![tag]
}

/// One recorded tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceEntry {
    /// Monotonic per-scope id: `E1`, `E2`, ...
    pub evidence_id: String,
    /// Tool name as requested by the model
    pub tool_name: String,
    /// Raw arguments JSON text
    pub arguments_json: String,
    /// Canonical tool key (see `tool_key`)
    pub tool_key: String,
    /// SHA-256 hex of the tool key
    pub tool_key_hash: String,
    /// SHA-256 hex of the tool output
    pub tool_output_hash: String,
    /// UTF-8 preview of the result, truncated to 400 bytes
    pub tool_result_preview: String,
    /// Normalized labels for tag lookup
    pub tags: Vec<String>,
    /// Whether the result classified as an error
    pub tool_was_error: bool,
    /// How many times this exact (key, output) pair was observed
    pub seen_count: u32,
    /// First observation time
    pub first_seen_at_utc: DateTime<Utc>,
    /// Latest observation time
    pub last_seen_at_utc: DateTime<Utc>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Default)]
struct LedgerInner {
    entries: Vec<EvidenceEntry>,
    next_id: u64,
}

/// Append-only evidence ledger
///
/// A single lock serializes mutations; readers get snapshots.
#[derive(Default)]
pub struct EvidenceLedger {
    inner: Mutex<LedgerInner>,
}

impl EvidenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tool execution.
    ///
    /// Returns the entry and whether it is new. `(tool_key_hash,
    /// tool_output_hash)` is unique: a repeat bumps `seen_count` and the
    /// last-seen timestamp without minting a new id.
    #[allow(clippy::too_many_arguments)]
    pub fn add_or_update(
        &self,
        tool_name: &str,
        arguments_json: &str,
        tool_key: &str,
        output: &[u8],
        tags: Vec<String>,
        was_error: bool,
        timestamp: DateTime<Utc>,
    ) -> (EvidenceEntry, bool) {
        let key_hash = sha256_hex(tool_key.as_bytes());
        let output_hash = sha256_hex(output);

        let mut inner = self.inner.lock().expect("ledger lock");

        if let Some(entry) = inner
            .entries
            .iter_mut()
            .find(|e| e.tool_key_hash == key_hash && e.tool_output_hash == output_hash)
        {
            entry.seen_count += 1;
            entry.last_seen_at_utc = timestamp;
            return (entry.clone(), false);
        }

        inner.next_id += 1;
        let preview = String::from_utf8_lossy(output);
        let entry = EvidenceEntry {
            evidence_id: format!("E{}", inner.next_id),
            tool_name: tool_name.to_string(),
            arguments_json: arguments_json.to_string(),
            tool_key: tool_key.to_string(),
            tool_key_hash: key_hash,
            tool_output_hash: output_hash,
            tool_result_preview: utf8_safe_prefix(&preview, PREVIEW_BYTES).to_string(),
            tags,
            tool_was_error: was_error,
            seen_count: 1,
            first_seen_at_utc: timestamp,
            last_seen_at_utc: timestamp,
        };
        inner.entries.push(entry.clone());
        (entry, true)
    }

    /// Newest entry (chronological) whose tag set contains `tag`,
    /// case-insensitively.
    pub fn latest_by_tag(&self, tag: &str) -> Option<EvidenceEntry> {
        let inner = self.inner.lock().expect("ledger lock");
        inner
            .entries
            .iter()
            .rev()
            .find(|e| e.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
            .cloned()
    }

    /// Snapshot of all entries in insertion (chronological) order
    pub fn entries(&self) -> Vec<EvidenceEntry> {
        self.inner.lock().expect("ledger lock").entries.clone()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.lock().expect("ledger lock").entries.len()
    }

    /// True when no evidence has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all entries and the id counter
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("ledger lock");
        inner.entries.clear();
        inner.next_id = 0;
    }
}
