//! Core configuration types
//!
//! Configuration for LLM providers (OpenAI, OpenRouter, Anthropic) and the
//! agent loop. Persistence is out of scope; everything is resolved from the
//! environment by `env.rs`.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::chat::ReasoningEffort;

/// Which LLM provider backs the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Anthropic,
}

impl ProviderKind {
    /// Parse a provider name as it appears in `DUMPSCOPE_LLM_PROVIDER`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "openrouter" => Some(ProviderKind::OpenRouter),
            "anthropic" | "claude" => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }

    /// Stable lowercase name used in cache paths
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Selected provider
    pub provider: ProviderKind,
    /// OpenAI configuration
    pub openai: Option<OpenAiConfig>,
    /// OpenRouter configuration
    pub openrouter: Option<OpenRouterConfig>,
    /// Anthropic configuration
    pub anthropic: Option<AnthropicConfig>,
    /// Agent loop configuration
    pub agent: AgentConfig,
}

impl Config {
    /// Model name for the selected provider (used in cache keys)
    pub fn model(&self) -> &str {
        match self.provider {
            ProviderKind::OpenAi => {
                self.openai.as_ref().map(|c| c.model.as_str()).unwrap_or("")
            }
            ProviderKind::OpenRouter => self
                .openrouter
                .as_ref()
                .map(|c| c.model.as_str())
                .unwrap_or(""),
            ProviderKind::Anthropic => self
                .anthropic
                .as_ref()
                .map(|c| c.model.as_str())
                .unwrap_or(""),
        }
    }

    /// Reasoning effort hint for the selected provider, if any
    pub fn reasoning_effort(&self) -> Option<ReasoningEffort> {
        match self.provider {
            ProviderKind::OpenAi => self.openai.as_ref().and_then(|c| c.reasoning_effort),
            ProviderKind::OpenRouter => {
                self.openrouter.as_ref().and_then(|c| c.reasoning_effort)
            }
            ProviderKind::Anthropic => {
                self.anthropic.as_ref().and_then(|c| c.reasoning_effort)
            }
        }
    }
}

/// OpenAI configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key
    pub api_key: SecretString,
    /// Model
    pub model: String,
    /// Base URL
    pub base_url: String,
    /// Reasoning effort hint
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// OpenRouter configuration
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    /// API key
    pub api_key: SecretString,
    /// Model
    pub model: String,
    /// Base URL
    pub base_url: String,
    /// Reasoning effort hint
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Anthropic configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key
    pub api_key: SecretString,
    /// Model
    pub model: String,
    /// Base URL
    pub base_url: String,
    /// Reasoning effort hint
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Agent loop configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum LLM round-trips before the loop is forcefully stopped
    pub max_iterations: u32,
    /// Character cap applied to each tool result before it enters history
    pub max_tool_result_chars: usize,
    /// How many loop breaks are tolerated before asking the user for guidance
    pub max_loop_breaks: u32,
    /// Token cap forwarded to the provider
    pub max_tokens: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_iterations: 20,
            max_tool_result_chars: 20_000,
            max_loop_breaks: 3,
            max_tokens: Some(4096),
        }
    }
}

pub(super) fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

pub(super) fn default_openrouter_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

pub(super) fn default_anthropic_url() -> String {
    "https://api.anthropic.com".to_string()
}

pub(super) fn default_timeout() -> u64 {
    120
}
