//! Provider-agnostic chat abstraction
//!
//! A uniform request/response shape across three provider wire formats:
//! - OpenAI-style chat/completions (`openai.rs`)
//! - OpenRouter (OpenAI-compatible with content-block tool-use fallback,
//!   `openrouter.rs`)
//! - Anthropic Messages (`anthropic.rs`)
//!
//! Providers normalize tool calls, structured content blocks, and the
//! reasoning-effort hint. API keys never appear in logs or errors; error
//! bodies are byte-capped and redacted before they surface.

mod anthropic;
mod client;
mod openai;
mod openrouter;
mod types;
pub(crate) mod util;

pub use anthropic::AnthropicClient;
pub use client::{build_client, ChatClient};
pub use openai::OpenAiClient;
pub use openrouter::OpenRouterClient;
pub use types::{
    value_to_text, ChatMessage, ChatRequest, ChatResult, ChatRole, ChatTool, ChatToolCall,
    ContentBlock, ReasoningEffort, ToolChoice,
};
