//! Per-scope orchestration state
//!
//! A session scope is `(server, session, dump)`. State is created lazily on
//! the first prompt in a scope and dropped only by an explicit reset or a
//! scope change. The session state owns the evidence ledger; callers borrow
//! it, there are no back-pointers.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::agent::evidence::EvidenceLedger;

/// Key identifying one orchestration scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SessionScope {
    pub server_url: Option<String>,
    pub session_id: Option<String>,
    pub dump_id: Option<String>,
}

impl SessionScope {
    pub fn new(
        server_url: Option<String>,
        session_id: Option<String>,
        dump_id: Option<String>,
    ) -> Self {
        SessionScope { server_url, session_id, dump_id }
    }
}

/// Orchestration state for one scope
#[derive(Default)]
pub struct SessionState {
    /// The evidence ledger, owned here
    pub ledger: EvidenceLedger,
    report: Mutex<ReportSnapshot>,
    last_checkpoint_json: Mutex<Option<String>>,
}

#[derive(Default, Clone)]
struct ReportSnapshot {
    dump_id: Option<String>,
    generated_at: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a metadata tool answer and remember the dump identity.
    ///
    /// Accepts both a bare metadata object and a wrapper with a `metadata`
    /// property; non-JSON answers are ignored.
    pub fn observe_metadata_answer(&self, output: &str) {
        let value: Value = match serde_json::from_str(output) {
            Ok(v) => v,
            Err(_) => return,
        };
        let meta = value.get("metadata").unwrap_or(&value);
        let mut report = self.report.lock().expect("report lock");
        if let Some(dump_id) = meta.get("dumpId").and_then(|v| v.as_str()) {
            if !dump_id.is_empty() {
                report.dump_id = Some(dump_id.to_string());
            }
        }
        if let Some(generated) = meta.get("generatedAt").and_then(|v| v.as_str()) {
            report.generated_at = Some(generated.to_string());
        }
    }

    /// Dump id from the latest metadata answer
    pub fn last_report_dump_id(&self) -> Option<String> {
        self.report.lock().expect("report lock").dump_id.clone()
    }

    /// Report generation time from the latest metadata answer
    pub fn last_report_generated_at(&self) -> Option<String> {
        self.report.lock().expect("report lock").generated_at.clone()
    }

    /// Remember the most recent checkpoint document
    pub fn set_last_checkpoint(&self, json: String) {
        *self.last_checkpoint_json.lock().expect("checkpoint lock") = Some(json);
    }

    /// The most recent checkpoint document, if any
    pub fn last_checkpoint(&self) -> Option<String> {
        self.last_checkpoint_json.lock().expect("checkpoint lock").clone()
    }
}

/// Process-wide store of session states keyed by scope
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionScope, Arc<SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the state for a scope, creating it lazily
    pub fn get_or_create(&self, scope: &SessionScope) -> Arc<SessionState> {
        self.sessions
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(SessionState::new()))
            .clone()
    }

    /// Drop the state for a scope (explicit reset)
    pub fn reset(&self, scope: &SessionScope) {
        self.sessions.remove(scope);
    }

    /// Number of live scopes
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no scope has state
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
