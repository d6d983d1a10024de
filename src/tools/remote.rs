//! Remote debugger tool client
//!
//! Drives the debugger service's `tools/call` surface over HTTP JSON-RPC.
//! Transport failures surface as connection errors; tool-level errors come
//! back inside the result text and are classified by the caller.

use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::protocol::{RpcRequest, RpcResponse, ToolCallResult};
use crate::error::{Error, Result};

/// Client for the remote debugger tool surface
pub struct RemoteToolClient {
    client: Client,
    /// JSON-RPC endpoint of the debugger service
    server_url: String,
    /// Request ID counter
    next_id: AtomicU64,
}

impl RemoteToolClient {
    /// Create a client for the given debugger service endpoint
    pub fn new(server_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(RemoteToolClient {
            client,
            server_url: server_url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// The endpoint this client talks to
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn send_request(
        &self,
        request: RpcRequest,
        cancel: &CancellationToken,
    ) -> Result<RpcResponse> {
        debug!("RPC request -> {}: {}", self.server_url, request.method);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.client.post(&self.server_url).json(&request).send() => {
                result.map_err(|e| Error::Connection(format!(
                    "Failed to reach debugger service: {}", e
                )))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Connection(format!(
                "Debugger service returned HTTP {}",
                status
            )));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(format!("Bad RPC response: {}", e)))?;
        Ok(parsed)
    }

    /// Call a tool and return its opaque UTF-8 result.
    ///
    /// A JSON-RPC error or an `isError` result is rendered as an `ERROR:`
    /// string rather than raised, so it can be recorded as evidence.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest::call_tool(id, name, arguments);
        let response = self.send_request(request, cancel).await?;

        if let Some(err) = response.error {
            warn!("Tool {} returned RPC error code {}", name, err.code);
            return Ok(format!("ERROR: {} (code {})", err.message, err.code));
        }

        let result = response.result.unwrap_or_default();
        let tool_result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| Error::InvalidResponse(format!("Bad tool result: {}", e)))?;

        if tool_result.is_error {
            warn!("Tool {} reported an error result", name);
        }
        Ok(tool_result.text())
    }
}
