//! Reasoning over any OpenAI-compatible chat completions endpoint.
//!
//! Works against OpenAI itself or local servers exposing the same API
//! (Ollama, vLLM, LM Studio) by pointing `base_url` at them.
//!
//! The API key is read from the environment variable named in
//! [`ReasoningConfig::api_key_env`] and held as a [`SecretString`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use secrecy::{ExposeSecret, SecretString};
use weft_core::invoker::ReasoningProvider;
use weft_types::config::ReasoningConfig;
use weft_types::error::ReasoningError;

/// Single-turn reasoning provider backed by `async_openai`.
///
/// Does NOT derive Debug: the client holds the API key.
pub struct OpenAiReasoningProvider {
    client: Client<OpenAIConfig>,
    default_model: String,
}

impl OpenAiReasoningProvider {
    pub fn new(api_key: SecretString, base_url: &str, default_model: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key.expose_secret())
            .with_api_base(base_url);

        Self {
            client: Client::with_config(openai_config),
            default_model: default_model.to_string(),
        }
    }

    /// Build a provider from config, reading the key from the environment.
    ///
    /// Returns [`ReasoningError::NotConfigured`] when the variable is unset.
    pub fn from_config(config: &ReasoningConfig) -> Result<Self, ReasoningError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            tracing::warn!(env = %config.api_key_env, "reasoning API key variable is not set");
            ReasoningError::NotConfigured
        })?;

        Ok(Self::new(
            SecretString::from(api_key),
            &config.base_url,
            &config.model,
        ))
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

/// Build a one-message chat request for `prompt`.
fn build_request(model: &str, prompt: &str) -> CreateChatCompletionRequest {
    CreateChatCompletionRequest {
        model: model.to_string(),
        messages: vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                name: None,
            },
        )],
        ..Default::default()
    }
}

impl ReasoningProvider for OpenAiReasoningProvider {
    async fn reason(&self, prompt: &str, model: Option<&str>) -> Result<String, ReasoningError> {
        let model = model.unwrap_or(&self.default_model);
        let request = build_request(model, prompt);

        tracing::debug!(model, prompt_len = prompt.len(), "sending reasoning request");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ReasoningError::Request(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or(ReasoningError::EmptyResponse)?;

        tracing::info!(model, response_len = content.len(), "reasoning completed");
        Ok(content)
    }
}
