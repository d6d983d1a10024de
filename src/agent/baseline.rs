//! Baseline policy and prompt classifier
//!
//! The baseline is the fixed minimal evidence set that must exist in the
//! ledger before a conclusion-seeking prompt may be answered: dump metadata,
//! the analysis summary and environment, and the four exception facets.

use crate::agent::evidence::{tags, EvidenceLedger};

/// A planned tool call the baseline requires
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedToolCall {
    /// Tag the resulting evidence will carry
    pub tag: &'static str,
    /// Tool to execute
    pub tool_name: &'static str,
    /// Arguments JSON text
    pub arguments_json: &'static str,
}

/// The canonical ordered baseline plan
pub fn baseline_plan() -> Vec<PlannedToolCall> {
    vec![
        PlannedToolCall {
            tag: tags::BASELINE_META,
            tool_name: "report_get",
            arguments_json: r#"{"path":"metadata"}"#,
        },
        PlannedToolCall {
            tag: tags::BASELINE_SUMMARY,
            tool_name: "report_get",
            arguments_json: r#"{"path":"analysis.summary"}"#,
        },
        PlannedToolCall {
            tag: tags::BASELINE_ENV,
            tool_name: "report_get",
            arguments_json: r#"{"path":"analysis.environment"}"#,
        },
        PlannedToolCall {
            tag: tags::BASELINE_EXC_TYPE,
            tool_name: "report_get",
            arguments_json: r#"{"path":"analysis.exception.type"}"#,
        },
        PlannedToolCall {
            tag: tags::BASELINE_EXC_MESSAGE,
            tool_name: "report_get",
            arguments_json: r#"{"path":"analysis.exception.message"}"#,
        },
        PlannedToolCall {
            tag: tags::BASELINE_EXC_HRESULT,
            tool_name: "report_get",
            arguments_json: r#"{"path":"analysis.exception.hResult"}"#,
        },
        PlannedToolCall {
            tag: tags::BASELINE_EXC_STACKTRACE,
            tool_name: "report_get",
            arguments_json: r#"{"path":"analysis.exception.stackTrace","select":["method","module","offset"]}"#,
        },
    ]
}

const CONCLUSION_MARKERS: &[&str] = &[
    "root cause",
    "why did",
    "why does",
    "what happened",
    "analyze",
    "analysis",
    "recommend",
    "recommendation",
    "conclusion",
    "explain the crash",
    "explain this crash",
];

/// True when the prompt asks for a root-cause style answer
pub fn is_conclusion_seeking(prompt: &str) -> bool {
    let normalized = prompt.trim().to_lowercase();
    CONCLUSION_MARKERS.iter().any(|m| normalized.contains(m))
}

/// Baseline items whose tag has no non-error latest entry yet
pub fn missing_baseline(ledger: &EvidenceLedger) -> Vec<PlannedToolCall> {
    baseline_plan()
        .into_iter()
        .filter(|item| {
            ledger
                .latest_by_tag(item.tag)
                .map(|entry| entry.tool_was_error)
                .unwrap_or(true)
        })
        .collect()
}

/// True when every baseline tag has a latest non-error entry
pub fn baseline_complete(ledger: &EvidenceLedger) -> bool {
    missing_baseline(ledger).is_empty()
}
