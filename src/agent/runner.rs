//! The agent loop
//!
//! Runs the iterative completion / tool-execution cycle against the remote
//! debugger tool surface: call the model, execute whatever tools it asks
//! for, record evidence, evaluate progress, and break loops with checkpoint
//! injection when the model stops producing new evidence.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::approval::{ApprovalGate, ApprovalOutcome, ApprovalState, AutoApproveGuard};
use crate::agent::baseline::{baseline_complete, is_conclusion_seeking, missing_baseline};
use crate::agent::checkpoint::{
    prune_history, synthesize, CheckpointInput, CheckpointKind, NextStep, CHECKPOINT_PREFIX,
};
use crate::agent::evidence::{tags, tags_for};
use crate::agent::session::SessionState;
use crate::agent::tool_key::tool_key;
use crate::chat::{ChatClient, ChatMessage, ChatRequest, ReasoningEffort, ToolChoice};
use crate::error::{Error, Result};
use crate::redact::redact_agent_trace;
use crate::tools::{is_error_result, ToolExecutor};
use crate::trace::TraceStore;

/// Marker inserted where a tool result was cut
const TRUNCATION_NOTE: &str = "truncated";

/// Configurable limits for the agent loop
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum LLM round-trips before the loop is forcefully stopped
    pub max_iterations: u32,
    /// Character cap applied to each tool result before it enters history
    pub max_tool_result_chars: usize,
    /// Loop breaks tolerated before asking the user for guidance
    pub max_loop_breaks: u32,
    /// Token cap forwarded to the provider
    pub max_tokens: Option<u32>,
    /// Reasoning effort hint forwarded to the provider
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            max_iterations: 20,
            max_tool_result_chars: 20_000,
            max_loop_breaks: 3,
            max_tokens: Some(4096),
            reasoning_effort: None,
        }
    }
}

/// Everything one agent run needs
pub struct AgentRunInput<'a> {
    /// Ordered seed messages: system prompt, runtime context, history, the
    /// current user prompt last
    pub messages: Vec<ChatMessage>,
    /// The current user prompt (classified for conclusion-seeking intent)
    pub user_prompt: String,
    /// Completion function
    pub client: &'a dyn ChatClient,
    /// Tool-execution function
    pub tools: &'a dyn ToolExecutor,
    /// Per-scope orchestration state
    pub session: &'a SessionState,
    /// Remembered approval grants for this scope
    pub approval: Arc<ApprovalState>,
    /// Confirmation prompt
    pub gate: &'a dyn ApprovalGate,
    /// Limits
    pub config: RunnerConfig,
    /// Best-effort trace sink
    pub trace: Option<Arc<TraceStore>>,
    /// Cancellation signal honored at every suspension point
    pub cancel: CancellationToken,
}

/// The result of one agent run
#[derive(Debug, Clone)]
pub struct AgentRunOutcome {
    /// Final assistant text (or an explanatory stop message)
    pub final_text: String,
    /// Completed iterations
    pub iterations: u32,
    /// Tool calls executed across the run, baseline prefetch included
    pub tool_calls_executed: u32,
}

/// Run the agent loop to completion
pub async fn run_agent(input: AgentRunInput<'_>) -> Result<AgentRunOutcome> {
    let AgentRunInput {
        mut messages,
        user_prompt,
        client,
        tools,
        session,
        approval,
        gate,
        config,
        trace,
        cancel,
    } = input;

    let conclusion_prompt = is_conclusion_seeking(&user_prompt);
    let tool_definitions = tools.definitions();

    let mut iteration: u32 = 0;
    let mut tool_calls_executed: u32 = 0;
    let mut total_new_evidence: u32 = 0;
    let mut no_progress_rounds: u32 = 0;
    let mut loop_breaks: u32 = 0;
    let mut baseline_prefetch_done = false;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        iteration += 1;

        // -- Iteration limit -------------------------------------------------
        if iteration > config.max_iterations {
            warn!("Agent loop exceeded max iterations");
            let checkpoint = store_checkpoint(
                session,
                CheckpointKind::IterationLimit,
                iteration - 1,
                tool_calls_executed,
                Some(total_new_evidence),
                conclusion_prompt,
            );
            let step = next_step_text(&checkpoint);
            return Ok(AgentRunOutcome {
                final_text: format!(
                    "(LLM agent stopped after {} steps) The iteration limit was reached. Suggested next step: {}",
                    iteration - 1,
                    step
                ),
                iterations: iteration - 1,
                tool_calls_executed,
            });
        }

        info!("Agent loop iteration {}/{}", iteration, config.max_iterations);

        // -- Completion ------------------------------------------------------
        let request = ChatRequest {
            messages: messages.clone(),
            tools: tool_definitions.clone(),
            tool_choice: ToolChoice::Auto,
            max_tokens: config.max_tokens,
            reasoning_effort: config.reasoning_effort,
        };
        let result = client.complete(&request, &cancel).await?;
        if let Some(store) = trace.as_deref() {
            store.append_event(
                "completion",
                json!({
                    "iteration": iteration,
                    "model": result.model,
                    "toolCallsRequested": result.tool_calls.len(),
                    "hasText": result.text.is_some(),
                }),
            );
        }

        // -- No tool calls: candidate final answer ---------------------------
        if result.tool_calls.is_empty() {
            let text = result.text.clone().unwrap_or_default();

            if conclusion_prompt && !baseline_complete(&session.ledger) {
                if !baseline_prefetch_done {
                    baseline_prefetch_done = true;
                    info!("Conclusion prompt with incomplete baseline, prefetching");
                    tool_calls_executed += prefetch_baseline(
                        tools,
                        session,
                        &approval,
                        config.max_tool_result_chars,
                        trace.as_deref(),
                        &cancel,
                    )
                    .await?;
                }

                if baseline_complete(&session.ledger) {
                    let checkpoint = store_checkpoint(
                        session,
                        CheckpointKind::BaselineRequired,
                        iteration,
                        tool_calls_executed,
                        Some(total_new_evidence),
                        conclusion_prompt,
                    );
                    messages.push(ChatMessage::system(format!(
                        "{}{}",
                        CHECKPOINT_PREFIX, checkpoint
                    )));
                    continue;
                }

                let missing: Vec<&str> = missing_baseline(&session.ledger)
                    .iter()
                    .map(|m| m.tag)
                    .collect();
                return Ok(AgentRunOutcome {
                    final_text: format!(
                        "Baseline is incomplete and the model is not requesting tools. Missing: {}",
                        missing.join(", ")
                    ),
                    iterations: iteration,
                    tool_calls_executed,
                });
            }

            store_checkpoint(
                session,
                CheckpointKind::CarryForward,
                iteration,
                tool_calls_executed,
                Some(total_new_evidence),
                conclusion_prompt,
            );
            if let Some(store) = trace.as_deref() {
                store.write_body(&format!("final-answer-{}", iteration), &text);
            }
            return Ok(AgentRunOutcome {
                final_text: text,
                iterations: iteration,
                tool_calls_executed,
            });
        }

        // -- Tool calls, serially in iteration order -------------------------
        messages.push(result.to_assistant_message());

        let mut new_evidence_this_iteration: u32 = 0;
        for call in &result.tool_calls {
            match approval.check(gate, &call.name, &call.arguments).await {
                ApprovalOutcome::Approved => {}
                ApprovalOutcome::Denied => {
                    messages.push(ChatMessage::tool(
                        &call.id,
                        "Tool call was denied by the user.",
                    ));
                    continue;
                }
                ApprovalOutcome::Cancelled => return Err(Error::Cancelled),
            }

            let (truncated, is_new) = execute_and_record(
                tools,
                session,
                &call.name,
                &call.arguments,
                config.max_tool_result_chars,
                trace.as_deref(),
                &cancel,
            )
            .await?;
            tool_calls_executed += 1;
            if is_new {
                new_evidence_this_iteration += 1;
                total_new_evidence += 1;
            }
            messages.push(ChatMessage::tool(&call.id, &truncated));
        }

        // -- Progress evaluation ---------------------------------------------
        if new_evidence_this_iteration == 0 {
            no_progress_rounds += 1;
            debug!("No new evidence this iteration ({} in a row)", no_progress_rounds);
        } else {
            no_progress_rounds = 0;
        }

        if no_progress_rounds >= 2 {
            no_progress_rounds = 0;
            loop_breaks += 1;
            warn!("Loop break {} of {}", loop_breaks, config.max_loop_breaks);

            let checkpoint = store_checkpoint(
                session,
                CheckpointKind::LoopBreak,
                iteration,
                tool_calls_executed,
                Some(total_new_evidence),
                conclusion_prompt,
            );

            if loop_breaks >= config.max_loop_breaks {
                let step = next_step_text(&checkpoint);
                return Ok(AgentRunOutcome {
                    final_text: format!(
                        "(LLM agent stopped after {} steps) No new evidence is being produced. Please guide the investigation; a possible next step is: {}",
                        iteration, step
                    ),
                    iterations: iteration,
                    tool_calls_executed,
                });
            }

            messages = prune_history(&messages, &checkpoint);
        }
    }
}

/// Execute one tool call, redact, truncate, record evidence, and trace it.
///
/// Returns the truncated text for history and whether the ledger grew.
async fn execute_and_record(
    tools: &dyn ToolExecutor,
    session: &SessionState,
    name: &str,
    arguments_json: &str,
    max_chars: usize,
    trace: Option<&TraceStore>,
    cancel: &CancellationToken,
) -> Result<(String, bool)> {
    debug!("Executing tool: {}", name);
    let raw = match tools.execute(name, arguments_json, cancel).await {
        Ok(output) => output,
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(err) if err.is_fatal() => return Err(err),
        // Contract errors become evidence, not exceptions.
        Err(err) => format!("ERROR: {}", err),
    };

    let redacted = redact_agent_trace(&raw);
    let was_error = is_error_result(&redacted);
    let key = tool_key(name, arguments_json);
    let call_tags = tags_for(name, arguments_json);

    if call_tags.iter().any(|t| t == tags::BASELINE_META) && !was_error {
        session.observe_metadata_answer(&redacted);
    }

    let (entry, is_new) = session.ledger.add_or_update(
        name,
        arguments_json,
        &key,
        redacted.as_bytes(),
        call_tags,
        was_error,
        Utc::now(),
    );

    if let Some(store) = trace {
        store.append_event(
            "tool_executed",
            json!({
                "tool": name,
                "evidenceId": entry.evidence_id,
                "new": is_new,
                "error": was_error,
                "seen": entry.seen_count,
            }),
        );
    }

    Ok((truncate_tool_result(&redacted, max_chars), is_new))
}

/// Execute every missing baseline call under a scoped approval override.
async fn prefetch_baseline(
    tools: &dyn ToolExecutor,
    session: &SessionState,
    approval: &Arc<ApprovalState>,
    max_chars: usize,
    trace: Option<&TraceStore>,
    cancel: &CancellationToken,
) -> Result<u32> {
    let _auto = AutoApproveGuard::new(approval.clone());
    let mut executed = 0;
    for item in missing_baseline(&session.ledger) {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        execute_and_record(
            tools,
            session,
            item.tool_name,
            item.arguments_json,
            max_chars,
            trace,
            cancel,
        )
        .await?;
        executed += 1;
    }
    Ok(executed)
}

/// Synthesize a checkpoint, remember it in the session state, return its JSON.
fn store_checkpoint(
    session: &SessionState,
    kind: CheckpointKind,
    iteration: u32,
    tool_calls_executed: u32,
    total_new_evidence: Option<u32>,
    prompt_is_conclusion: bool,
) -> String {
    let doc = synthesize(&CheckpointInput {
        kind,
        iteration,
        tool_calls_executed,
        total_new_evidence,
        prompt_is_conclusion,
        dump_id: session.last_report_dump_id(),
        report_generated_at: session.last_report_generated_at(),
        ledger: &session.ledger,
    });
    let json = doc.to_string();
    session.set_last_checkpoint(json.clone());
    json
}

/// Extract the suggested next step from a checkpoint document.
fn next_step_text(checkpoint_json: &str) -> String {
    serde_json::from_str::<serde_json::Value>(checkpoint_json)
        .ok()
        .and_then(|doc| doc.get("nextSteps").and_then(|s| s.get(0)).cloned())
        .and_then(|step| serde_json::from_value::<NextStep>(step).ok())
        .map(|step| step.describe())
        .unwrap_or_else(|| "report_index({})".to_string())
}

/// Truncate a tool result to `max_chars` characters.
///
/// Keeps a head/tail split around an explicit truncation marker; caps below
/// 128 characters keep only the head.
pub fn truncate_tool_result(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    if max_chars < 128 {
        return text.chars().take(max_chars).collect();
    }

    let marker = format!("\n... [{}, total {} chars]\n", TRUNCATION_NOTE, total);
    let marker_chars = marker.chars().count();
    let available = max_chars.saturating_sub(marker_chars);
    let head_chars = available / 2 + available % 2;
    let tail_chars = available / 2;

    let head: String = text.chars().take(head_chars).collect();
    let tail: String = text
        .chars()
        .skip(total - tail_chars)
        .collect();
    format!("{}{}{}", head, marker, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_under_cap_unchanged() {
        assert_eq!(truncate_tool_result("short", 128), "short");
    }

    #[test]
    fn test_truncation_respects_cap() {
        let text = "x".repeat(50_000);
        for cap in [128usize, 500, 20_000] {
            let out = truncate_tool_result(&text, cap);
            assert!(out.chars().count() <= cap, "cap {} violated", cap);
            assert!(out.contains(TRUNCATION_NOTE));
        }
    }

    #[test]
    fn test_truncation_tiny_cap_is_head_only() {
        let text = "abcdefghij".repeat(100);
        let out = truncate_tool_result(&text, 10);
        assert_eq!(out, "abcdefghij");
    }

    #[test]
    fn test_truncation_keeps_head_and_tail() {
        let mut text = String::from("HEAD-MARKER ");
        text.push_str(&"x".repeat(10_000));
        text.push_str(" TAIL-MARKER");
        let out = truncate_tool_result(&text, 1000);
        assert!(out.starts_with("HEAD-MARKER"));
        assert!(out.ends_with("TAIL-MARKER"));
    }

    #[test]
    fn test_truncation_multibyte_safe() {
        let text = "€".repeat(10_000);
        let out = truncate_tool_result(&text, 200);
        assert!(out.chars().count() <= 200);
        // Well-formed UTF-8 by construction; char-based slicing never splits.
        assert!(out.contains('€'));
    }

    #[test]
    fn test_next_step_text_fallback() {
        assert_eq!(next_step_text("not json"), "report_index({})");
        let json = r#"{"nextSteps":[{"tool":"report_get","argsJson":{"path":"metadata"}}]}"#;
        assert!(next_step_text(json).starts_with("report_get"));
        let hint = r#"{"nextSteps":[{"hint":"report_get(path=analysis.threads)"}]}"#;
        assert_eq!(next_step_text(hint), "report_get(path=analysis.threads)");
    }
}
