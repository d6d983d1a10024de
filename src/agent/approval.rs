//! Tool approval gate
//!
//! The agent may require confirmation before executing a tool. Decisions are
//! tri-state per call with remembered grants per scope; a scoped override
//! disables confirmation for automatic runs and restores the previous
//! setting on every exit path.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// The user's answer to a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Permit this call, remember nothing
    AllowOnce,
    /// Permit this tool name for the rest of the scope
    AllowToolAlways,
    /// Permit everything for the rest of the scope
    AllowAllAlways,
    /// Refuse this call only
    DenyOnce,
    /// Abort the agent entirely
    CancelRun,
}

/// Net effect of an approval check on one tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Denied,
    Cancelled,
}

/// Something that can ask the user for confirmation
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Ask whether `tool_name(arguments_json)` may run
    async fn confirm(&self, tool_name: &str, arguments_json: &str) -> ApprovalDecision;
}

/// A gate that approves everything (automatic runs, tests)
pub struct AllowAllGate;

#[async_trait]
impl ApprovalGate for AllowAllGate {
    async fn confirm(&self, _tool_name: &str, _arguments_json: &str) -> ApprovalDecision {
        ApprovalDecision::AllowOnce
    }
}

#[derive(Default)]
struct Grants {
    allow_all: bool,
    allowed_tools: HashSet<String>,
    confirmation_disabled: bool,
}

/// Remembered approval grants for one scope
#[derive(Default)]
pub struct ApprovalState {
    grants: Mutex<Grants>,
}

impl ApprovalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one tool call against the remembered grants, prompting
    /// through `gate` only when necessary.
    pub async fn check(
        &self,
        gate: &dyn ApprovalGate,
        tool_name: &str,
        arguments_json: &str,
    ) -> ApprovalOutcome {
        {
            let grants = self.grants.lock().expect("grants lock");
            if grants.confirmation_disabled
                || grants.allow_all
                || grants.allowed_tools.contains(tool_name)
            {
                return ApprovalOutcome::Approved;
            }
        }

        match gate.confirm(tool_name, arguments_json).await {
            ApprovalDecision::AllowOnce => ApprovalOutcome::Approved,
            ApprovalDecision::AllowToolAlways => {
                self.grants
                    .lock()
                    .expect("grants lock")
                    .allowed_tools
                    .insert(tool_name.to_string());
                ApprovalOutcome::Approved
            }
            ApprovalDecision::AllowAllAlways => {
                self.grants.lock().expect("grants lock").allow_all = true;
                ApprovalOutcome::Approved
            }
            ApprovalDecision::DenyOnce => ApprovalOutcome::Denied,
            ApprovalDecision::CancelRun => ApprovalOutcome::Cancelled,
        }
    }

    fn set_confirmation_disabled(&self, disabled: bool) -> bool {
        let mut grants = self.grants.lock().expect("grants lock");
        std::mem::replace(&mut grants.confirmation_disabled, disabled)
    }
}

/// Scoped confirmation override.
///
/// While alive, the approval state approves everything without prompting.
/// Dropping the guard restores the previous setting on every exit path,
/// panic unwinding included.
pub struct AutoApproveGuard {
    state: Arc<ApprovalState>,
    previous: bool,
}

impl AutoApproveGuard {
    pub fn new(state: Arc<ApprovalState>) -> Self {
        let previous = state.set_confirmation_disabled(true);
        AutoApproveGuard { state, previous }
    }
}

impl Drop for AutoApproveGuard {
    fn drop(&mut self) {
        self.state.set_confirmation_disabled(self.previous);
    }
}
