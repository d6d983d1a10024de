//! LLM agent orchestration core
//!
//! The pieces that turn a chat model into a disciplined crash investigator:
//! the runner (iterative completion/tool loop), the evidence ledger, the
//! baseline policy, the checkpoint synthesizer, per-scope session state and
//! the approval gate.

pub mod approval;
pub mod baseline;
pub mod checkpoint;
pub mod evidence;
pub mod prompt;
pub mod runner;
pub mod session;
pub mod tool_key;

pub use approval::{
    AllowAllGate, ApprovalDecision, ApprovalGate, ApprovalOutcome, ApprovalState,
    AutoApproveGuard,
};
pub use baseline::{baseline_complete, baseline_plan, is_conclusion_seeking, PlannedToolCall};
pub use checkpoint::{CheckpointKind, NextStep};
pub use evidence::{EvidenceEntry, EvidenceLedger};
pub use prompt::{seed_messages, SYSTEM_PROMPT};
pub use runner::{run_agent, AgentRunInput, AgentRunOutcome, RunnerConfig};
pub use session::{SessionScope, SessionState, SessionStore};
pub use tool_key::{canonical_json, tool_key};
