//! Chat client trait and provider selection

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::anthropic::AnthropicClient;
use super::openai::OpenAiClient;
use super::openrouter::OpenRouterClient;
use super::types::{ChatRequest, ChatResult};
use crate::config::{Config, ProviderKind};
use crate::error::{Error, Result};

/// A provider-agnostic chat completion client
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run a single completion. Suspends on the network; returns promptly on
    /// cancellation.
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResult>;

    /// The model this client targets
    fn model(&self) -> &str;

    /// Stable provider name (used in cache paths)
    fn provider_name(&self) -> &'static str;
}

/// Build the chat client selected by the configuration
pub fn build_client(config: &Config) -> Result<Box<dyn ChatClient>> {
    match config.provider {
        ProviderKind::OpenAi => {
            let cfg = config
                .openai
                .clone()
                .ok_or_else(|| Error::Config("OpenAI provider selected but not configured".into()))?;
            Ok(Box::new(OpenAiClient::new(cfg)?))
        }
        ProviderKind::OpenRouter => {
            let cfg = config.openrouter.clone().ok_or_else(|| {
                Error::Config("OpenRouter provider selected but not configured".into())
            })?;
            Ok(Box::new(OpenRouterClient::new(cfg)?))
        }
        ProviderKind::Anthropic => {
            let cfg = config.anthropic.clone().ok_or_else(|| {
                Error::Config("Anthropic provider selected but not configured".into())
            })?;
            Ok(Box::new(AnthropicClient::new(cfg)?))
        }
    }
}
