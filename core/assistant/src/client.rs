use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::LLMConfig;
use crate::error::{AssistantError, AssistantResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A text-completion capability: messages in, one completion out.
/// Implementations must report transport and protocol failures as
/// [`AssistantError::ExternalService`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> AssistantResult<String>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAICompatibleClient {
    config: LLMConfig,
    client: Client,
}

impl OpenAICompatibleClient {
    pub fn new(config: LLMConfig) -> AssistantResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    async fn complete(&self, messages: &[ChatMessage]) -> AssistantResult<String> {
        let url = self.config.completions_url();

        let request_body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
        });

        debug!("Calling chat completions at {} (model {})", url, self.config.model);

        let mut request = self.client.post(&url).json(&request_body);

        if let Some(ref api_key) = self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AssistantError::external(format!(
                "Completion API error {}: {}",
                status, error_text
            )));
        }

        let completion: OpenAIResponse = response.json().await.map_err(|e| {
            AssistantError::external(format!("Failed to parse completion response: {}", e))
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AssistantError::external("No response from completion API"))
    }
}
