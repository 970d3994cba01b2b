/*!
 * Extraction backends.
 *
 * This module contains client implementations for the language model servers
 * the extractor can talk to:
 * - OpenAI: any OpenAI-compatible chat completions API (OpenAI, DeepSeek, proxies)
 * - Ollama: Local LLM server
 * - Mock: scripted backend for tests and benchmarks
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

use crate::errors::ProviderError;

/// Common trait for all extraction backends
///
/// Backends are used as trait objects by the chunk processor, so the trait
/// only speaks in prompts and plain response text.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Submit a prompt and return the raw response text
    ///
    /// # Arguments
    /// * `prompt` - Full prompt text
    /// * `model` - Model identifier understood by the backend
    /// * `timeout` - Upper bound for the whole request
    async fn submit(&self, prompt: &str, model: &str, timeout: Duration) -> Result<String, ProviderError>;

    /// Test the connection to the provider
    ///
    /// # Returns
    /// * `Result<(), ProviderError>` - Ok if the connection is successful, or an error
    async fn test_connection(&self, model: &str) -> Result<(), ProviderError>;

    /// Short display name used in logs
    fn name(&self) -> &'static str;
}

/// Map a transport error onto the provider error taxonomy
pub(crate) fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else if error.is_connect() {
        ProviderError::ConnectionError(error.to_string())
    } else if error.is_body() || error.is_decode() {
        ProviderError::StreamTruncated(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

/// Map a non-success HTTP status onto the provider error taxonomy
pub(crate) fn map_status_error(status_code: u16, message: String) -> ProviderError {
    match status_code {
        401 | 403 => ProviderError::AuthenticationError(message),
        429 => ProviderError::RateLimitExceeded(message),
        _ => ProviderError::ApiError { status_code, message },
    }
}

/// Parse a JSON body, treating a premature end of input as truncation
pub(crate) fn parse_json_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| {
        if e.is_eof() {
            ProviderError::StreamTruncated(format!("response ended early: {}", e))
        } else {
            ProviderError::ParseError(format!("{}: {}", e, truncate_for_log(body, 200)))
        }
    })
}

fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

pub mod ollama;
pub mod openai;
pub mod mock;
