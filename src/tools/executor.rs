//! Combined tool executor
//!
//! Dispatches report-navigation tools to the local cache and everything else
//! to the remote debugger service.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::remote::RemoteToolClient;
use super::report_nav::ReportNavigator;
use super::traits::{builtin_tool_definitions, ToolExecutor};
use crate::chat::ChatTool;
use crate::error::Result;

/// The tool surface the agent runs against
pub struct DebuggerToolExecutor {
    remote: RemoteToolClient,
    navigator: Arc<ReportNavigator>,
}

impl DebuggerToolExecutor {
    pub fn new(remote: RemoteToolClient, navigator: Arc<ReportNavigator>) -> Self {
        DebuggerToolExecutor { remote, navigator }
    }
}

#[async_trait]
impl ToolExecutor for DebuggerToolExecutor {
    fn definitions(&self) -> Vec<ChatTool> {
        builtin_tool_definitions()
    }

    async fn execute(
        &self,
        name: &str,
        arguments_json: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let arguments: Value = match serde_json::from_str(arguments_json) {
            Ok(v) => v,
            Err(e) => return Ok(format!("ERROR: tool arguments are not valid JSON: {}", e)),
        };

        match name {
            "find_report_sections" => Ok(self.navigator.find_sections(&arguments)),
            "get_report_section" => Ok(self.navigator.get_section(&arguments)),
            _ => self.remote.call_tool(name, arguments, cancel).await,
        }
    }
}
