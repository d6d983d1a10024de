//! Checkpoint synthesizer
//!
//! A checkpoint is a machine-readable JSON snapshot of the investigation
//! injected into pruned conversations to re-ground the model: where the
//! evidence stands, what failed, and the single best next step. Checkpoints
//! are synthesized only between iterations, never mid-completion.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::agent::baseline::{baseline_plan, missing_baseline, PlannedToolCall};
use crate::agent::evidence::EvidenceLedger;
use crate::chat::{ChatMessage, ChatRole};

/// Marker prefixing the injected checkpoint system message
pub const CHECKPOINT_PREFIX: &str =
    "INTERNAL CHECKPOINT (machine-readable JSON, authoritative):\n";

/// Marker identifying the runtime-context user message the prune keeps
pub const RUNTIME_CONTEXT_PREFIX: &str = "CLI runtime context";

/// How many trailing non-system messages survive a prune
const PRUNE_TAIL: usize = 12;

/// Evidence entries included in the checkpoint index
const EVIDENCE_INDEX_MAX: usize = 25;

/// Why this checkpoint was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    CarryForward,
    LoopBreak,
    BaselineRequired,
    IterationLimit,
}

/// The single suggested next action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NextStep {
    /// A concrete tool call
    Call {
        tool: String,
        #[serde(rename = "argsJson")]
        args_json: Value,
    },
    /// A freeform hint lifted from a tool error message
    Hint { hint: String },
}

impl NextStep {
    /// Human-readable rendering for stop messages
    pub fn describe(&self) -> String {
        match self {
            NextStep::Call { tool, args_json } => format!("{}({})", tool, args_json),
            NextStep::Hint { hint } => hint.clone(),
        }
    }
}

/// Inputs to checkpoint synthesis
pub struct CheckpointInput<'a> {
    pub kind: CheckpointKind,
    pub iteration: u32,
    pub tool_calls_executed: u32,
    pub total_new_evidence: Option<u32>,
    pub prompt_is_conclusion: bool,
    pub dump_id: Option<String>,
    pub report_generated_at: Option<String>,
    pub ledger: &'a EvidenceLedger,
}

/// Synthesize the checkpoint JSON document
pub fn synthesize(input: &CheckpointInput<'_>) -> Value {
    let entries = input.ledger.entries();
    let missing = missing_baseline(input.ledger);
    let baseline_ok = missing.is_empty();

    // Latest entry per baseline tag, by id.
    let mut baseline_evidence = Map::new();
    for item in baseline_plan() {
        if let Some(entry) = input.ledger.latest_by_tag(item.tag) {
            if !entry.tool_was_error {
                baseline_evidence.insert(item.tag.to_string(), json!(entry.evidence_id));
            }
        }
    }

    let index_start = entries.len().saturating_sub(EVIDENCE_INDEX_MAX);
    let evidence_index: Vec<Value> = entries[index_start..]
        .iter()
        .map(|e| {
            json!({
                "id": e.evidence_id,
                "tool": e.tool_name,
                "tags": e.tags,
                "preview": e.tool_result_preview,
                "error": e.tool_was_error,
                "seen": e.seen_count,
            })
        })
        .collect();

    // The most recent failing tool key must not be retried verbatim.
    let do_not_repeat: Vec<String> = entries
        .iter()
        .rev()
        .find(|e| e.tool_was_error)
        .map(|e| vec![e.tool_key.clone()])
        .unwrap_or_default();

    let next_step = select_next_step(input.ledger, input.prompt_is_conclusion);

    let mut facts: Vec<String> = Vec::new();
    facts.push("Cite evidence by id (E1, E2, ...) when stating findings.".to_string());
    if baseline_ok {
        facts.push("Baseline evidence is complete.".to_string());
    } else {
        facts.push("Gather the missing baseline items before concluding.".to_string());
    }
    if !do_not_repeat.is_empty() {
        facts.push("Do not repeat the tool calls listed in doNotRepeat.".to_string());
    }

    let mut doc = Map::new();
    doc.insert("version".into(), json!(1));
    doc.insert("kind".into(), serde_json::to_value(input.kind).expect("kind serializes"));
    doc.insert("iteration".into(), json!(input.iteration));
    doc.insert("toolCallsExecuted".into(), json!(input.tool_calls_executed));
    if let Some(total) = input.total_new_evidence {
        doc.insert("totalNewEvidence".into(), json!(total));
    }
    doc.insert(
        "promptKind".into(),
        json!(if input.prompt_is_conclusion { "conclusion" } else { "interactive" }),
    );
    doc.insert(
        "reportSnapshot".into(),
        json!({
            "dumpId": input.dump_id,
            "generatedAt": input.report_generated_at,
        }),
    );
    doc.insert(
        "phase".into(),
        json!({
            "baselineComplete": baseline_ok,
            "missingBaseline": missing.iter().map(|m| m.tag).collect::<Vec<_>>(),
        }),
    );
    doc.insert("baselineEvidence".into(), Value::Object(baseline_evidence));
    doc.insert("evidenceIndex".into(), Value::Array(evidence_index));
    doc.insert("doNotRepeat".into(), json!(do_not_repeat));
    doc.insert(
        "nextSteps".into(),
        json!([serde_json::to_value(&next_step).expect("next step serializes")]),
    );
    doc.insert("facts".into(), json!(facts));
    Value::Object(doc)
}

/// Pick the single best next step.
///
/// Priority: repair hints from the latest `report_get` error, then the first
/// missing baseline item on a conclusion prompt, then re-orientation via
/// `report_index`.
pub fn select_next_step(ledger: &EvidenceLedger, prompt_is_conclusion: bool) -> NextStep {
    let entries = ledger.entries();
    if let Some(latest) = entries.last() {
        if latest.tool_was_error && latest.tool_name.eq_ignore_ascii_case("report_get") {
            if let Some(step) = repair_report_get(&latest.arguments_json, &latest.tool_result_preview)
            {
                return step;
            }
        }
    }

    if prompt_is_conclusion {
        if let Some(item) = missing_baseline(ledger).first() {
            return planned_call_step(item);
        }
    }

    NextStep::Call {
        tool: "report_index".to_string(),
        args_json: json!({}),
    }
}

fn planned_call_step(item: &PlannedToolCall) -> NextStep {
    NextStep::Call {
        tool: item.tool_name.to_string(),
        args_json: serde_json::from_str(item.arguments_json).unwrap_or(json!({})),
    }
}

/// Derive a corrected `report_get` call from a failing one
fn repair_report_get(arguments_json: &str, preview: &str) -> Option<NextStep> {
    // 1. Explicit "Try:" hints win.
    for line in preview.lines() {
        if let Some(rest) = line.trim().strip_prefix("Try:") {
            let hint = rest.trim();
            if !hint.is_empty() {
                return Some(NextStep::Hint { hint: hint.to_string() });
            }
        }
    }

    let mut args: Map<String, Value> = serde_json::from_str(arguments_json).unwrap_or_default();

    // 2. Stale cursor: retry the same call without it.
    if preview.contains("invalid_cursor") {
        args.remove("cursor");
        return Some(NextStep::Call {
            tool: "report_get".to_string(),
            args_json: Value::Object(args),
        });
    }

    let path = args.get("path").and_then(|p| p.as_str()).unwrap_or("").to_string();

    // 3. Out-of-range index: page the same path instead.
    if preview.contains("Invalid array index") {
        return Some(NextStep::Call {
            tool: "report_get".to_string(),
            args_json: json!({"path": path, "limit": 10}),
        });
    }

    // 4. Unresolvable `items` segment: strip it and page.
    if preview.contains("items") && preview.contains("resolve") && path.contains(".items") {
        let stripped = path.replace(".items", "");
        return Some(NextStep::Call {
            tool: "report_get".to_string(),
            args_json: json!({"path": stripped, "limit": 20}),
        });
    }

    None
}

/// Prune conversation history around a freshly synthesized checkpoint.
///
/// Keeps the first system message and the first `CLI runtime context` user
/// message, injects the checkpoint as an authoritative system message, then
/// appends the last 12 non-system messages.
pub fn prune_history(messages: &[ChatMessage], checkpoint_json: &str) -> Vec<ChatMessage> {
    let first_system = messages.iter().position(|m| m.role == ChatRole::System);
    let runtime_context = messages.iter().position(|m| {
        m.role == ChatRole::User && m.content.starts_with(RUNTIME_CONTEXT_PREFIX)
    });

    let non_system: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(i, m)| m.role != ChatRole::System && Some(*i) != runtime_context)
        .map(|(i, _)| i)
        .collect();
    let tail_start = non_system.len().saturating_sub(PRUNE_TAIL);
    let tail: Vec<usize> = non_system[tail_start..].to_vec();

    let mut pruned = Vec::with_capacity(PRUNE_TAIL + 3);
    if let Some(i) = first_system {
        pruned.push(messages[i].clone());
    }
    if let Some(i) = runtime_context {
        pruned.push(messages[i].clone());
    }
    pruned.push(ChatMessage::system(format!("{}{}", CHECKPOINT_PREFIX, checkpoint_json)));
    for i in tail {
        pruned.push(messages[i].clone());
    }
    pruned
}
