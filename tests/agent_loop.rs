//! End-to-end agent loop scenarios with a scripted completion function and
//! an in-memory tool executor.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use dumpscope::agent::{
    run_agent, AgentRunInput, AllowAllGate, ApprovalState, RunnerConfig, SessionState,
};
use dumpscope::chat::{ChatClient, ChatMessage, ChatRequest, ChatResult, ChatRole, ChatToolCall};
use dumpscope::error::Result;
use dumpscope::tools::{builtin_tool_definitions, ToolExecutor};

/// Completion function scripted with a queue of canned results; records the
/// message list of every request it serves.
struct ScriptedClient {
    responses: Mutex<VecDeque<ChatResult>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedClient {
    fn new(responses: Vec<ChatResult>) -> Self {
        ScriptedClient {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn seen_requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn complete(
        &self,
        request: &ChatRequest,
        _cancel: &CancellationToken,
    ) -> Result<ChatResult> {
        self.requests.lock().unwrap().push(request.messages.clone());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted"))
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

fn text_result(text: &str) -> ChatResult {
    ChatResult {
        model: "scripted".into(),
        text: Some(text.into()),
        ..Default::default()
    }
}

fn tool_result(calls: Vec<(&str, &str, &str)>) -> ChatResult {
    ChatResult {
        model: "scripted".into(),
        text: None,
        tool_calls: calls
            .into_iter()
            .map(|(id, name, args)| ChatToolCall {
                id: id.into(),
                name: name.into(),
                arguments: args.into(),
            })
            .collect(),
        ..Default::default()
    }
}

/// Tool executor answering from a fixed function
struct StubTools {
    respond: Box<dyn Fn(&str, &Value) -> String + Send + Sync>,
    executed: Mutex<Vec<String>>,
}

impl StubTools {
    fn new(respond: impl Fn(&str, &Value) -> String + Send + Sync + 'static) -> Self {
        StubTools { respond: Box::new(respond), executed: Mutex::new(Vec::new()) }
    }

    fn executed_tools(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for StubTools {
    fn definitions(&self) -> Vec<dumpscope::chat::ChatTool> {
        builtin_tool_definitions()
    }

    async fn execute(
        &self,
        name: &str,
        arguments_json: &str,
        _cancel: &CancellationToken,
    ) -> Result<String> {
        self.executed.lock().unwrap().push(name.to_string());
        let args: Value = serde_json::from_str(arguments_json).unwrap_or_default();
        Ok((self.respond)(name, &args))
    }
}

fn seed_messages(prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are a crash-dump investigator."),
        ChatMessage::user("CLI runtime context: server=local dump=d1"),
        ChatMessage::user(prompt),
    ]
}

fn run_input<'a>(
    prompt: &str,
    client: &'a ScriptedClient,
    tools: &'a StubTools,
    session: &'a SessionState,
    gate: &'a AllowAllGate,
) -> AgentRunInput<'a> {
    AgentRunInput {
        messages: seed_messages(prompt),
        user_prompt: prompt.to_string(),
        client,
        tools,
        session,
        approval: Arc::new(ApprovalState::new()),
        gate,
        config: RunnerConfig::default(),
        trace: None,
        cancel: CancellationToken::new(),
    }
}

/// Baseline answers keyed by report path
fn baseline_stub(name: &str, args: &Value) -> String {
    let path = args.get("path").and_then(|p| p.as_str()).unwrap_or("");
    match (name, path) {
        ("report_get", "metadata") => {
            r#"{"dumpId": "d1", "generatedAt": "2026-02-01T10:00:00Z"}"#.into()
        }
        ("report_get", "analysis.summary") => r#"{"verdict": "unhandled exception"}"#.into(),
        ("report_get", "analysis.environment") => r#"{"os": "linux", "clr": "8.0"}"#.into(),
        ("report_get", "analysis.exception.type") => "System.InvalidOperationException".into(),
        ("report_get", "analysis.exception.message") => "Collection was modified".into(),
        ("report_get", "analysis.exception.hResult") => "0x80131509".into(),
        ("report_get", "analysis.exception.stackTrace") => {
            r#"[{"method": "Enumerate", "module": "App.dll", "offset": 12}]"#.into()
        }
        _ => format!("stub output for {}", name),
    }
}

// ---------------------------------------------------------------------------
// Scenario: baseline prefetch on a conclusion prompt with no tool calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn baseline_prefetch_on_conclusion_prompt() {
    let client = ScriptedClient::new(vec![
        text_result("It crashed, probably."),
        text_result("Root cause: the collection was mutated during enumeration (E1-E7)."),
    ]);
    let tools = StubTools::new(baseline_stub);
    let session = SessionState::new();
    let gate = AllowAllGate;

    let outcome = run_agent(run_input(
        "what is the root cause?",
        &client,
        &tools,
        &session,
        &gate,
    ))
    .await
    .unwrap();

    // The full baseline plan executed exactly once.
    assert_eq!(outcome.tool_calls_executed, 7);
    assert_eq!(tools.executed_tools().len(), 7);
    assert!(dumpscope::agent::baseline_complete(&session.ledger));
    assert!(outcome.final_text.starts_with("Root cause:"));

    // The prefetch surfaced a baseline_required checkpoint to the model.
    let second_request = &client.seen_requests()[1];
    let injected = second_request
        .iter()
        .find(|m| m.role == ChatRole::System && m.content.contains("INTERNAL CHECKPOINT"))
        .expect("checkpoint message injected");
    assert!(injected.content.contains("baseline_required"));

    // Dump identity extracted from the metadata answer.
    assert_eq!(session.last_report_dump_id().as_deref(), Some("d1"));
}

#[tokio::test]
async fn baseline_still_incomplete_returns_explanation() {
    // Every baseline call fails, so the prefetch cannot complete the set and
    // the run ends right after the single prefetch attempt.
    let client = ScriptedClient::new(vec![text_result("I think it crashed.")]);
    let tools = StubTools::new(|_, _| "ERROR: dump not open".to_string());
    let session = SessionState::new();
    let gate = AllowAllGate;

    let outcome = run_agent(run_input(
        "explain this crash",
        &client,
        &tools,
        &session,
        &gate,
    ))
    .await
    .unwrap();

    assert!(outcome
        .final_text
        .starts_with("Baseline is incomplete and the model is not requesting tools."));
    assert!(outcome.final_text.contains("BASELINE_META"));
    // The prefetch ran the whole plan once before giving up.
    assert_eq!(outcome.tool_calls_executed, 7);
    assert_eq!(client.seen_requests().len(), 1);
}

// ---------------------------------------------------------------------------
// Scenario: duplicate tool output de-duplication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_tool_output_bumps_seen_count() {
    let client = ScriptedClient::new(vec![
        tool_result(vec![("c1", "exec", r#"{"command": "!clrstack"}"#)]),
        tool_result(vec![("c2", "exec", r#"{"command": "  !ClrStack "}"#)]),
        text_result("The stack shows a blocked finalizer."),
    ]);
    let tools = StubTools::new(|_, _| "OS Thread Id: 0x1a\nSystem.Threading.Monitor.Wait".into());
    let session = SessionState::new();
    let gate = AllowAllGate;

    let outcome = run_agent(run_input(
        "show me the stack",
        &client,
        &tools,
        &session,
        &gate,
    ))
    .await
    .unwrap();

    // Both calls executed; the ledger grew once.
    assert_eq!(outcome.tool_calls_executed, 2);
    let entries = session.ledger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].seen_count, 2);
    assert_eq!(entries[0].evidence_id, "E1");
}

// ---------------------------------------------------------------------------
// Scenario: loop break after two no-progress iterations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn loop_break_prunes_and_injects_checkpoint() {
    let repeat_call = || tool_result(vec![("c", "exec", r#"{"command": "!threads"}"#)]);
    let client = ScriptedClient::new(vec![
        repeat_call(),
        repeat_call(),
        text_result("Understood, changing approach."),
    ]);
    let output = "ThreadCount: 12";
    let tools = StubTools::new(move |_, _| output.to_string());
    let session = SessionState::new();
    let gate = AllowAllGate;

    // The identical evidence is already in the ledger, so iterations 1 and 2
    // produce nothing new.
    session.ledger.add_or_update(
        "exec",
        r#"{"command": "!threads"}"#,
        &dumpscope::agent::tool_key("exec", r#"{"command": "!threads"}"#),
        output.as_bytes(),
        vec!["EXEC".into()],
        false,
        chrono::Utc::now(),
    );

    let outcome = run_agent(run_input(
        "keep looking at threads",
        &client,
        &tools,
        &session,
        &gate,
    ))
    .await
    .unwrap();

    assert_eq!(outcome.final_text, "Understood, changing approach.");

    // Iteration 3 ran on a pruned history with the loop-break checkpoint.
    let requests = client.seen_requests();
    assert_eq!(requests.len(), 3);
    let third = &requests[2];
    let checkpoint = third
        .iter()
        .find(|m| m.content.starts_with("INTERNAL CHECKPOINT"))
        .expect("loop-break checkpoint injected");
    let json_start = checkpoint.content.find('{').unwrap();
    let doc: Value = serde_json::from_str(&checkpoint.content[json_start..]).unwrap();
    assert_eq!(doc["kind"], "loop_break");
    assert!(!doc["nextSteps"].as_array().unwrap().is_empty());

    // The first system message and runtime context survived the prune.
    assert_eq!(third[0].role, ChatRole::System);
    assert!(third[1].content.starts_with("CLI runtime context"));

    // The checkpoint also landed in the session state.
    assert!(session.last_checkpoint().unwrap().contains("loop_break"));
}

#[tokio::test]
async fn three_loop_breaks_ask_for_guidance() {
    // Six no-progress iterations in a row: three loop breaks, then stop.
    let repeat_call = || tool_result(vec![("c", "exec", r#"{"command": "!eeheap"}"#)]);
    let client = ScriptedClient::new(vec![
        repeat_call(), repeat_call(), repeat_call(),
        repeat_call(), repeat_call(), repeat_call(),
    ]);
    let output = "Heap 0 (0x55d0)";
    let tools = StubTools::new(move |_, _| output.to_string());
    let session = SessionState::new();
    let gate = AllowAllGate;

    session.ledger.add_or_update(
        "exec",
        r#"{"command": "!eeheap"}"#,
        &dumpscope::agent::tool_key("exec", r#"{"command": "!eeheap"}"#),
        output.as_bytes(),
        vec!["EXEC".into()],
        false,
        chrono::Utc::now(),
    );

    let outcome = run_agent(run_input("inspect the heap", &client, &tools, &session, &gate))
        .await
        .unwrap();

    assert!(outcome.final_text.contains("(LLM agent stopped after"));
    assert!(outcome.final_text.contains("Please guide"));
    assert_eq!(outcome.iterations, 6);
}

// ---------------------------------------------------------------------------
// Iteration limit carries a suggested next step
// ---------------------------------------------------------------------------

#[tokio::test]
async fn iteration_limit_suggests_next_step() {
    // Every iteration produces fresh evidence, so no loop break fires and the
    // iteration cap is what stops the run.
    let mut script = Vec::new();
    for i in 0..3 {
        script.push(tool_result(vec![(
            "c",
            "exec",
            Box::leak(format!(r#"{{"command": "!cmd{}"}}"#, i).into_boxed_str()),
        )]));
    }
    let client = ScriptedClient::new(script);
    let counter = Arc::new(Mutex::new(0u32));
    let tools = StubTools::new(move |_, args| {
        let mut n = counter.lock().unwrap();
        *n += 1;
        format!("output {} for {}", n, args)
    });
    let session = SessionState::new();
    let gate = AllowAllGate;

    let mut input = run_input("walk the heap", &client, &tools, &session, &gate);
    input.config.max_iterations = 3;

    let outcome = run_agent(input).await.unwrap();
    assert_eq!(outcome.iterations, 3);
    assert!(outcome.final_text.contains("Suggested next step:"));
    assert!(session.last_checkpoint().unwrap().contains("iteration_limit"));
}

// ---------------------------------------------------------------------------
// Denied tool calls leave a tool message and execute nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn denied_tool_call_is_not_executed() {
    struct DenyGate;

    #[async_trait]
    impl dumpscope::agent::ApprovalGate for DenyGate {
        async fn confirm(&self, _t: &str, _a: &str) -> dumpscope::agent::ApprovalDecision {
            dumpscope::agent::ApprovalDecision::DenyOnce
        }
    }

    let client = ScriptedClient::new(vec![
        tool_result(vec![("c1", "exec", r#"{"command": "!dangerous"}"#)]),
        text_result("Skipping that."),
    ]);
    let tools = StubTools::new(|_, _| "should never run".into());
    let session = SessionState::new();
    let gate = DenyGate;

    let outcome = run_agent(AgentRunInput {
        messages: seed_messages("try something"),
        user_prompt: "try something".into(),
        client: &client,
        tools: &tools,
        session: &session,
        approval: Arc::new(ApprovalState::new()),
        gate: &gate,
        config: RunnerConfig::default(),
        trace: None,
        cancel: CancellationToken::new(),
    })
    .await
    .unwrap();

    assert_eq!(outcome.tool_calls_executed, 0);
    assert!(tools.executed_tools().is_empty());
    assert!(session.ledger.is_empty());

    // The denial was answered to the model as a tool message.
    let second = &client.seen_requests()[1];
    let denial = second
        .iter()
        .find(|m| m.role == ChatRole::Tool)
        .expect("denial tool message");
    assert!(denial.content.contains("denied"));
}
