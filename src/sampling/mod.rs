//! MCP sampling translation
//!
//! Adapts an MCP-style `sampling/createMessage` request onto the internal
//! chat request and back, including the fallback extraction of tool-use
//! objects embedded in plain text (`blocks.rs`).

mod blocks;
mod translator;

pub use blocks::extract_embedded_tool_uses;
pub use translator::{
    emit_create_message_result, handle_create_message, parse_create_message, NullProgressSink,
    ProgressSink,
};
