//! Dumpscope CLI
//!
//! A thin one-shot front end over the agent core: ask a question about an
//! open dump, run a cached canonical analysis, reset a session scope, or
//! print the trace directory. The interactive shell proper lives elsewhere;
//! this binary only wires the pieces together.

use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{theme::ColorfulTheme, Select};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use dumpscope::agent::{
    run_agent, seed_messages, AgentRunInput, AgentRunOutcome, ApprovalDecision, ApprovalGate,
    ApprovalState, RunnerConfig, SessionScope, SessionStore,
};
use dumpscope::analysis::{AnalysisCache, AnalysisKey};
use dumpscope::chat::build_client;
use dumpscope::config::{
    ai_analysis_cache_dir, load_from_env, report_cache_dir, trace_root_dir, Config,
};
use dumpscope::report::{
    compose_attachment, detect_structured_report, AttachmentBudget, ReportCache,
};
use dumpscope::tools::{DebuggerToolExecutor, RemoteToolClient, ReportNavigator};
use dumpscope::trace::TraceStore;
use dumpscope::{Error, Result, VERSION};

#[derive(Parser)]
#[command(
    name = "dumpscope",
    author = "Dumpscope Contributors",
    version = VERSION,
    about = "Investigate crash dumps with an LLM agent driving a remote debugger",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the agent a question about the opened dump
    Ask {
        /// The question or instruction
        prompt: String,

        /// Debugger service endpoint
        #[arg(long, env = "DUMPSCOPE_SERVER_URL")]
        server: String,

        /// Debugger session id
        #[arg(long)]
        session: Option<String>,

        /// Dump id within the session
        #[arg(long)]
        dump: Option<String>,

        /// Attach a structured report file to the prompt
        #[arg(long)]
        report: Option<PathBuf>,

        /// Approve all tool calls without asking
        #[arg(long, short)]
        yes: bool,
    },

    /// Run (or replay from cache) the canonical crash analysis for a dump
    Analyze {
        #[arg(long, env = "DUMPSCOPE_SERVER_URL")]
        server: String,
        #[arg(long)]
        session: Option<String>,
        /// Dump id the analysis is keyed on
        #[arg(long)]
        dump: String,
        /// Ignore the cached result and run again
        #[arg(long)]
        fresh: bool,
    },

    /// Drop the session state for a scope
    Reset {
        #[arg(long, env = "DUMPSCOPE_SERVER_URL")]
        server: String,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        dump: Option<String>,
    },

    /// Print the trace root directory
    TraceDir,
}

/// Interactive confirmation prompt
struct TerminalGate;

#[async_trait::async_trait]
impl ApprovalGate for TerminalGate {
    async fn confirm(&self, tool_name: &str, arguments_json: &str) -> ApprovalDecision {
        println!(
            "\n{} {}({})",
            style("Tool call:").bold().yellow(),
            tool_name,
            arguments_json
        );
        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Allow this tool call?")
            .items(&[
                "Allow once",
                "Always allow this tool",
                "Always allow everything",
                "Deny this call",
                "Cancel the run",
            ])
            .default(0)
            .interact();

        match choice {
            Ok(0) => ApprovalDecision::AllowOnce,
            Ok(1) => ApprovalDecision::AllowToolAlways,
            Ok(2) => ApprovalDecision::AllowAllAlways,
            Ok(3) => ApprovalDecision::DenyOnce,
            _ => ApprovalDecision::CancelRun,
        }
    }
}

/// Gate used with `--yes` and automatic runs
struct YesGate;

#[async_trait::async_trait]
impl ApprovalGate for YesGate {
    async fn confirm(&self, _tool: &str, _args: &str) -> ApprovalDecision {
        ApprovalDecision::AllowOnce
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dumpscope=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ask { prompt, server, session, dump, report, yes } => {
            let config = load_from_env()?;
            let (outcome, trace) =
                run_prompt(&config, &prompt, server, session, dump, report, yes, "ask").await?;
            print_outcome(&outcome, &trace);
            Ok(())
        }
        Commands::Analyze { server, session, dump, fresh } => {
            analyze(server, session, dump, fresh).await
        }
        Commands::Reset { server, session, dump } => {
            let store = SessionStore::new();
            store.reset(&SessionScope::new(Some(server), session, dump));
            println!("Session state dropped.");
            Ok(())
        }
        Commands::TraceDir => {
            println!("{}", trace_root_dir().display());
            Ok(())
        }
    }
}

const CANONICAL_ANALYSIS_PROMPT: &str =
    "Analyze this crash and explain the root cause with supporting evidence.";

async fn analyze(
    server: String,
    session: Option<String>,
    dump: String,
    fresh: bool,
) -> Result<()> {
    let config = load_from_env()?;
    let cache = AnalysisCache::new(ai_analysis_cache_dir());
    let key = AnalysisKey {
        dump_id: dump.clone(),
        provider: config.provider.name().to_string(),
        model: config.model().to_string(),
        effort: config
            .reasoning_effort()
            .map(|e| e.name().to_string())
            .unwrap_or_else(|| "default".to_string()),
    };

    if !fresh {
        if let Some(cached) = cache.get(&key) {
            println!("{}", cached);
            println!("\n{}", style("[cached analysis]").dim());
            return Ok(());
        }
    }

    let (outcome, trace) = run_prompt(
        &config,
        CANONICAL_ANALYSIS_PROMPT,
        server,
        session,
        Some(dump),
        None,
        true,
        "analyze",
    )
    .await?;

    if let Err(e) = cache.put(&key, &outcome.final_text) {
        warn!("Could not cache the analysis: {}", e);
    }
    print_outcome(&outcome, &trace);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_prompt(
    config: &Config,
    prompt: &str,
    server: String,
    session: Option<String>,
    dump: Option<String>,
    report: Option<PathBuf>,
    yes: bool,
    label: &str,
) -> Result<(AgentRunOutcome, Arc<TraceStore>)> {
    let client = build_client(config)?;

    let navigator = Arc::new(ReportNavigator::new());
    let mut attachment: Option<String> = None;

    if let Some(path) = &report {
        match detect_structured_report(path)? {
            Some(detected) => {
                let cache = ReportCache::new(report_cache_dir());
                let manifest = cache.get_or_build(path, &detected.dump_id)?;
                let manifest_json = serde_json::to_string_pretty(&manifest)?;
                let summary_json = std::fs::read_to_string(manifest.cache_dir.join("summary.json"))
                    .unwrap_or_else(|_| manifest_json.clone());
                let label = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                attachment = Some(compose_attachment(
                    &label,
                    &manifest_json,
                    &summary_json,
                    &AttachmentBudget::default(),
                ));
                navigator.attach(label, manifest);
            }
            None => {
                warn!("{} is not a structured report, ignoring", path.display());
            }
        }
    }

    let remote = RemoteToolClient::new(server.clone(), 120)?;
    let executor = DebuggerToolExecutor::new(remote, navigator);

    let store = SessionStore::new();
    let scope = SessionScope::new(Some(server), session, dump);
    let state = store.get_or_create(&scope);

    let messages = seed_messages(&scope, attachment, prompt);

    let trace = Arc::new(TraceStore::create(&trace_root_dir(), label));
    let cancel = CancellationToken::new();
    let cancel_on_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_ctrlc.cancel();
        }
    });

    let interactive_gate = TerminalGate;
    let yes_gate = YesGate;
    let gate: &dyn ApprovalGate = if yes { &yes_gate } else { &interactive_gate };

    let outcome = run_agent(AgentRunInput {
        messages,
        user_prompt: prompt.to_string(),
        client: client.as_ref(),
        tools: &executor,
        session: &state,
        approval: Arc::new(ApprovalState::new()),
        gate,
        config: RunnerConfig {
            max_iterations: config.agent.max_iterations,
            max_tool_result_chars: config.agent.max_tool_result_chars,
            max_loop_breaks: config.agent.max_loop_breaks,
            max_tokens: config.agent.max_tokens,
            reasoning_effort: config.reasoning_effort(),
        },
        trace: Some(trace.clone()),
        cancel,
    })
    .await;

    match outcome {
        Ok(outcome) => Ok((outcome, trace)),
        Err(Error::Cancelled) => {
            println!("\n{}", style("Run cancelled.").red());
            std::process::exit(130);
        }
        Err(e) => Err(e),
    }
}

fn print_outcome(outcome: &AgentRunOutcome, trace: &TraceStore) {
    println!("\n{}", outcome.final_text);
    println!(
        "\n{}",
        style(format!(
            "[{} iterations, {} tool calls, trace: {}]",
            outcome.iterations,
            outcome.tool_calls_executed,
            trace.dir().display()
        ))
        .dim()
    );
}
