//! Environment variable resolution
//!
//! The recognized set, per provider prefix (`OPENAI`, `OPENROUTER`,
//! `ANTHROPIC`):
//! - `<PREFIX>_API_KEY`
//! - `<PREFIX>_MODEL`
//! - `<PREFIX>_BASE_URL`
//! - `<PREFIX>_REASONING_EFFORT` (low | medium | high | unset | none)
//! - `<PREFIX>_TIMEOUT_SECONDS`
//!
//! plus `DUMPSCOPE_LLM_PROVIDER` to select the provider and the cache root
//! overrides handled in `paths.rs`.

use secrecy::SecretString;

use super::types::{
    default_anthropic_url, default_openai_url, default_openrouter_url, default_timeout,
    AgentConfig, AnthropicConfig, Config, OpenAiConfig, OpenRouterConfig, ProviderKind,
};
use crate::chat::ReasoningEffort;
use crate::error::{Error, Result};

/// Environment variable prefix for a provider
pub fn provider_env_prefix(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "OPENAI",
        ProviderKind::OpenRouter => "OPENROUTER",
        ProviderKind::Anthropic => "ANTHROPIC",
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn provider_var(kind: ProviderKind, suffix: &str) -> Option<String> {
    var(&format!("{}_{}", provider_env_prefix(kind), suffix))
}

fn effort_from_env(kind: ProviderKind) -> Option<ReasoningEffort> {
    provider_var(kind, "REASONING_EFFORT").and_then(|v| ReasoningEffort::parse(&v))
}

fn timeout_from_env(kind: ProviderKind) -> u64 {
    provider_var(kind, "TIMEOUT_SECONDS")
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(default_timeout)
}

fn default_model(kind: ProviderKind) -> String {
    match kind {
        ProviderKind::OpenAi => "gpt-4o".to_string(),
        ProviderKind::OpenRouter => "anthropic/claude-sonnet-4".to_string(),
        ProviderKind::Anthropic => "claude-sonnet-4-20250514".to_string(),
    }
}

/// Load the full configuration from the environment.
///
/// Fails fast with a configuration error when the selected provider has no
/// API key, before any remote I/O happens.
pub fn load_from_env() -> Result<Config> {
    let provider = match var("DUMPSCOPE_LLM_PROVIDER") {
        Some(name) => ProviderKind::parse(&name).ok_or_else(|| {
            Error::Config(format!("Unknown LLM provider: {}", name))
        })?,
        None => ProviderKind::OpenAi,
    };

    let openai = provider_var(ProviderKind::OpenAi, "API_KEY").map(|key| OpenAiConfig {
        api_key: SecretString::from(key),
        model: provider_var(ProviderKind::OpenAi, "MODEL")
            .unwrap_or_else(|| default_model(ProviderKind::OpenAi)),
        base_url: provider_var(ProviderKind::OpenAi, "BASE_URL")
            .unwrap_or_else(default_openai_url),
        reasoning_effort: effort_from_env(ProviderKind::OpenAi),
        timeout_secs: timeout_from_env(ProviderKind::OpenAi),
    });

    let openrouter =
        provider_var(ProviderKind::OpenRouter, "API_KEY").map(|key| OpenRouterConfig {
            api_key: SecretString::from(key),
            model: provider_var(ProviderKind::OpenRouter, "MODEL")
                .unwrap_or_else(|| default_model(ProviderKind::OpenRouter)),
            base_url: provider_var(ProviderKind::OpenRouter, "BASE_URL")
                .unwrap_or_else(default_openrouter_url),
            reasoning_effort: effort_from_env(ProviderKind::OpenRouter),
            timeout_secs: timeout_from_env(ProviderKind::OpenRouter),
        });

    let anthropic =
        provider_var(ProviderKind::Anthropic, "API_KEY").map(|key| AnthropicConfig {
            api_key: SecretString::from(key),
            model: provider_var(ProviderKind::Anthropic, "MODEL")
                .unwrap_or_else(|| default_model(ProviderKind::Anthropic)),
            base_url: provider_var(ProviderKind::Anthropic, "BASE_URL")
                .unwrap_or_else(default_anthropic_url),
            reasoning_effort: effort_from_env(ProviderKind::Anthropic),
            timeout_secs: timeout_from_env(ProviderKind::Anthropic),
        });

    let configured = match provider {
        ProviderKind::OpenAi => openai.is_some(),
        ProviderKind::OpenRouter => openrouter.is_some(),
        ProviderKind::Anthropic => anthropic.is_some(),
    };
    if !configured {
        return Err(Error::Config(format!(
            "Missing {}_API_KEY for selected provider",
            provider_env_prefix(provider)
        )));
    }

    Ok(Config {
        provider,
        openai,
        openrouter,
        anthropic,
        agent: AgentConfig::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_env_prefix() {
        assert_eq!(provider_env_prefix(ProviderKind::OpenAi), "OPENAI");
        assert_eq!(provider_env_prefix(ProviderKind::Anthropic), "ANTHROPIC");
    }

    #[test]
    fn test_default_models() {
        assert_eq!(default_model(ProviderKind::OpenAi), "gpt-4o");
        assert!(default_model(ProviderKind::OpenRouter).contains('/'));
    }
}
