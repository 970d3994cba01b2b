use std::time::Duration;
use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use reqwest::Client;
use log::{debug, error, warn};
use url::Url;

use crate::errors::ProviderError;
use super::{Provider, map_reqwest_error, map_status_error, parse_json_body};

/// Public OpenAI API root, used when no endpoint is configured
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible chat completion APIs (OpenAI, DeepSeek, proxies)
#[derive(Debug)]
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API root such as `https://api.openai.com/v1`
    endpoint: String,
    /// Sampling temperature
    temperature: f32,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<OpenAIMessage>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Chat message format
#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAIMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,

    /// Content of the message
    #[serde(default)]
    pub content: String,
}

/// Token usage information
#[derive(Debug, Default, Deserialize)]
pub struct TokenUsage {
    /// Number of prompt tokens
    pub prompt_tokens: u32,
    /// Number of completion tokens
    pub completion_tokens: u32,
}

/// Single completion choice
#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    /// Generated message
    pub message: OpenAIMessage,
    /// Why generation stopped (`stop`, `length`, ...)
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    /// Completion choices, normally exactly one
    pub choices: Vec<OpenAIChoice>,
    /// Token usage information
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl OpenAIRequest {
    /// Create a new chat completion request
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(OpenAIMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Limit the completion length
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl OpenAI {
    /// Create a new client; an empty endpoint means the public OpenAI API
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, temperature: f32) -> Self {
        let endpoint = endpoint.into();
        Self {
            client: Client::builder()
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: if endpoint.trim().is_empty() {
                DEFAULT_ENDPOINT.to_string()
            } else {
                endpoint
            },
            temperature,
        }
    }

    /// Full URL of the chat completions route
    pub fn chat_url(&self) -> Result<Url, ProviderError> {
        let root = format!("{}/", self.endpoint.trim_end_matches('/'));
        Url::parse(&root)
            .and_then(|base| base.join("chat/completions"))
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid endpoint '{}': {}", self.endpoint, e)))
    }

    /// Complete a chat request
    pub async fn complete(&self, request: OpenAIRequest, timeout: Duration) -> Result<OpenAIResponse, ProviderError> {
        let url = self.chat_url()?;

        let response = self.client.post(url)
            .timeout(timeout)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| map_reqwest_error(e, timeout))?;

        if !status.is_success() {
            error!("OpenAI-compatible API error ({}): {}", status, body);
            return Err(map_status_error(status.as_u16(), body));
        }

        parse_json_body(&body)
    }

    /// Extract text from a chat completion response
    pub fn extract_text(response: &OpenAIResponse) -> Result<String, ProviderError> {
        let choice = response.choices.first()
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!("Model output hit the completion limit; trailing terms may be cut off");
        }

        Ok(choice.message.content.clone())
    }
}

#[async_trait]
impl Provider for OpenAI {
    async fn submit(&self, prompt: &str, model: &str, timeout: Duration) -> Result<String, ProviderError> {
        let request = OpenAIRequest::new(model)
            .add_message("user", prompt)
            .temperature(self.temperature);

        let response = self.complete(request, timeout).await?;
        if let Some(usage) = &response.usage {
            debug!(
                "{} answered ({} prompt tokens, {} completion tokens)",
                model, usage.prompt_tokens, usage.completion_tokens
            );
        }
        Self::extract_text(&response)
    }

    async fn test_connection(&self, model: &str) -> Result<(), ProviderError> {
        let request = OpenAIRequest::new(model)
            .add_message("user", "Hello")
            .max_tokens(5);

        self.complete(request, Duration::from_secs(30)).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "OpenAI"
    }
}
