use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use super::{Provider, map_reqwest_error, map_status_error, parse_json_body};

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Sampling temperature sent with every request
    temperature: f32,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation (default: 0.8)
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Generated text
    pub response: String,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
    /// Number of prompt tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

impl GenerationRequest {
    /// Create a new non-streaming generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: None,
            stream: Some(false),
        }
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        match &mut self.options {
            Some(options) => options.temperature = Some(temperature),
            None => {
                self.options = Some(GenerationOptions {
                    temperature: Some(temperature),
                    num_predict: None,
                })
            }
        }
        self
    }
}

impl Ollama {
    /// Create a new Ollama client for `host` (with or without scheme) and `port`
    pub fn new(host: impl Into<String>, port: u16, temperature: f32) -> Self {
        Self {
            base_url: Self::base_url(&host.into(), port),
            client: Client::builder()
                // Ollama uses HTTP/1.1
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            temperature,
        }
    }

    fn base_url(host: &str, port: u16) -> String {
        match host.split_once("://") {
            Some((scheme, rest)) => {
                let rest = rest.trim_end_matches('/');
                if rest.contains(':') {
                    format!("{}://{}", scheme, rest)
                } else {
                    format!("{}://{}:{}", scheme, rest, port)
                }
            }
            None => format!("http://{}:{}", host.trim_end_matches('/'), port),
        }
    }

    /// Generate text with a single request
    pub async fn generate(&self, request: GenerationRequest, timeout: Duration) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self.client.post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| map_reqwest_error(e, timeout))?;

        if !status.is_success() {
            error!("Ollama API error ({}): {}", status, body);
            return Err(map_status_error(status.as_u16(), body));
        }

        match parse_json_body::<GenerationResponse>(&body) {
            Ok(generated) => Ok(generated),
            Err(ProviderError::ParseError(message)) => {
                // Some proxies ignore `stream: false` and answer in JSONL
                Self::collect_stream(&body).ok_or(ProviderError::ParseError(message))
            }
            Err(other) => Err(other),
        }
    }

    /// Concatenate a JSONL streaming body; a body without a `done` line is truncated
    fn collect_stream(body: &str) -> Option<GenerationResponse> {
        let mut response = String::new();
        let mut last: Option<GenerationResponse> = None;

        for line in body.lines().filter(|line| !line.trim().is_empty()) {
            let part: GenerationResponse = serde_json::from_str(line).ok()?;
            response.push_str(&part.response);
            last = Some(part);
        }

        last.map(|last| GenerationResponse { response, ..last })
    }

    /// Get the server version
    pub async fn version(&self) -> Result<String, ProviderError> {
        let url = format!("{}/api/version", self.base_url);
        let timeout = Duration::from_secs(10);

        let response = self.client.get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| map_reqwest_error(e, timeout))?;
        if !status.is_success() {
            return Err(map_status_error(status.as_u16(), body));
        }

        Ok(parse_json_body::<VersionResponse>(&body)?.version)
    }
}

#[async_trait]
impl Provider for Ollama {
    async fn submit(&self, prompt: &str, model: &str, timeout: Duration) -> Result<String, ProviderError> {
        let request = GenerationRequest::new(model, prompt).temperature(self.temperature);
        let response = self.generate(request, timeout).await?;

        if !response.done {
            return Err(ProviderError::StreamTruncated(
                "Ollama response is not marked done".to_string(),
            ));
        }

        debug!(
            "Ollama {} answered ({} prompt tokens, {} completion tokens)",
            response.model,
            response.prompt_eval_count.unwrap_or(0),
            response.eval_count.unwrap_or(0)
        );
        Ok(response.response)
    }

    async fn test_connection(&self, _model: &str) -> Result<(), ProviderError> {
        let version = self.version().await?;
        debug!("Connected to Ollama {}", version);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Ollama"
    }
}
