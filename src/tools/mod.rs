//! Tool surface
//!
//! The agent consumes a remote debugger tool surface over JSON-RPC
//! (`remote.rs`) plus two local report-navigation tools answered from the
//! report cache (`report_nav.rs`). `DebuggerToolExecutor` dispatches between
//! them behind the single `ToolExecutor` seam the runner sees.

mod executor;
mod protocol;
mod remote;
mod report_nav;
mod traits;

pub use executor::DebuggerToolExecutor;
pub use protocol::{RpcError, RpcRequest, RpcResponse, ToolContent, ToolCallResult};
pub use remote::RemoteToolClient;
pub use report_nav::ReportNavigator;
pub use traits::{builtin_tool_definitions, is_error_result, ToolExecutor};
