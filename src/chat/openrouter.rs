//! OpenRouter API client
//!
//! OpenAI-compatible wire format. Some routed providers emit tool calls as
//! `tool_use` blocks inside the assistant content array instead of the
//! `tool_calls` field; parsing lifts those into tool calls and preserves the
//! block array verbatim for the echo turn.

use reqwest::{header, Client};
use secrecy::ExposeSecret;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::client::ChatClient;
use super::openai::{classify_http_error, parse_completion, wire_messages, wire_tool_choice, wire_tools};
use super::types::{ChatRequest, ChatResult, ToolChoice};
use crate::config::OpenRouterConfig;
use crate::error::{Error, Result};

/// OpenRouter API client
pub struct OpenRouterClient {
    client: Client,
    config: OpenRouterConfig,
}

impl OpenRouterClient {
    /// Create a new OpenRouter client
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!(
            "Bearer {}",
            config.api_key.expose_secret()
        ))
        .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(OpenRouterClient { client, config })
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), Value::String(self.config.model.clone()));
        body.insert("messages".into(), Value::Array(wire_messages(&request.messages)));
        if !request.tools.is_empty() && request.tool_choice != ToolChoice::None {
            body.insert("tools".into(), wire_tools(request));
            body.insert("tool_choice".into(), wire_tool_choice(&request.tool_choice));
        }
        if let Some(max) = request.max_tokens {
            body.insert("max_tokens".into(), json!(max));
        }
        if let Some(effort) = request.reasoning_effort {
            body.insert("reasoning".into(), json!({"effort": effort.name()}));
        }
        Value::Object(body)
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenRouterClient {
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResult> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = self.build_body(request);
        debug!("Sending request to OpenRouter: model={}", self.config.model);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.client.post(&url).json(&body).send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &text));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        info!("OpenRouter response: model={}", self.config.model);
        parse_completion(&payload, true)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn provider_name(&self) -> &'static str {
        "openrouter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;

    fn test_config() -> OpenRouterConfig {
        OpenRouterConfig {
            api_key: SecretString::from("test-key"),
            model: "anthropic/claude-sonnet-4".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            reasoning_effort: None,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_client_creation() {
        assert!(OpenRouterClient::new(test_config()).is_ok());
    }

    #[test]
    fn test_content_block_tool_use_lifted() {
        let payload = json!({
            "model": "anthropic/claude-sonnet-4",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": [
                        {"type": "text", "text": "Checking the stack."},
                        {"type": "tool_use", "id": "tu_1", "name": "clr_stack", "input": {"threadId": 3}}
                    ]
                }
            }]
        });
        let result = parse_completion(&payload, true).unwrap();
        assert_eq!(result.text.as_deref(), Some("Checking the stack."));
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].id, "tu_1");
        assert_eq!(result.tool_calls[0].name, "clr_stack");
        // The block array survives verbatim for the echo turn.
        assert!(result.raw_content.as_ref().unwrap().is_array());
    }

    #[test]
    fn test_single_object_content_wrapped() {
        let payload = json!({
            "model": "m",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": {"type": "text", "text": "lone block"}
                }
            }]
        });
        let result = parse_completion(&payload, true).unwrap();
        assert_eq!(result.text.as_deref(), Some("lone block"));
        assert_eq!(result.raw_content.as_ref().unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_reasoning_effort_in_body() {
        let client = OpenRouterClient::new(test_config()).unwrap();
        let mut request = ChatRequest::from_messages(vec![]);
        request.reasoning_effort = Some(crate::chat::ReasoningEffort::High);
        let body = client.build_body(&request);
        assert_eq!(body["reasoning"]["effort"], "high");
    }
}
