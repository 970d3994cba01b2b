/*!
 * Mock provider implementations for testing.
 *
 * This module provides mock providers that simulate different behaviors:
 * - `MockProvider::working()` - Always succeeds with a term block
 * - `MockProvider::fail_first(n, failure)` - Fails `n` times, then succeeds
 * - `MockProvider::failing()` - Always fails with an error
 * - `MockProvider::slow(ms)` - Succeeds after a delay, for timeout testing
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::Provider;

/// A request as seen by the mock provider
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// Full prompt text
    pub prompt: String,
    /// Requested model
    pub model: String,
    /// 1-based sequence number of the request
    pub number: usize,
}

/// Kind of simulated backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The request timed out
    Timeout,
    /// 502 from a gateway in front of the model
    Gateway,
    /// The response stream ended early
    Truncated,
}

impl MockFailure {
    fn to_error(self, number: usize) -> ProviderError {
        match self {
            Self::Timeout => ProviderError::Timeout(Duration::from_secs(30)),
            Self::Gateway => ProviderError::ApiError {
                status_code: 502,
                message: format!("Simulated gateway failure (request #{})", number),
            },
            Self::Truncated => ProviderError::StreamTruncated(format!(
                "Simulated unexpected EOF (request #{})",
                number
            )),
        }
    }
}

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a term block
    Working,
    /// Fails the first `failures` requests, then succeeds
    FailFirst { failures: usize, failure: MockFailure },
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with the given failure
    Failing(MockFailure),
    /// Returns empty response
    Empty,
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
}

/// Mock provider for testing extraction behavior
#[derive(Debug)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    /// Every request received, shared between clones
    requests: Arc<Mutex<Vec<MockRequest>>>,
    /// Custom response generator (optional)
    custom_response: Option<fn(&MockRequest) -> String>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            custom_response: None,
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock that fails `failures` times before succeeding
    pub fn fail_first(failures: usize, failure: MockFailure) -> Self {
        Self::new(MockBehavior::FailFirst { failures, failure })
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    /// Create a failing mock provider that always returns a gateway error
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing(MockFailure::Gateway))
    }

    /// Create a mock that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Create a mock that answers after `delay_ms`
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Set a custom response generator
    pub fn with_custom_response(mut self, generator: fn(&MockRequest) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Snapshot of all requests received so far
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    /// Format one term block the way the extraction prompt asks for
    pub fn term_block(term: &str, definition: &str, translation: &str, relevance: f64) -> String {
        format!(
            "Термин: {}\nОпределение: {}\nПеревод: {}\nРелевантность: {}%\n",
            term, definition, translation, relevance
        )
    }

    fn respond(&self, request: &MockRequest) -> String {
        match self.custom_response {
            Some(generator) => generator(request),
            None => Self::term_block(
                &format!("Term {}", request.number),
                "Simulated definition",
                "Симулированный перевод",
                90.0,
            ),
        }
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            requests: Arc::clone(&self.requests),
            custom_response: self.custom_response,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn submit(&self, prompt: &str, model: &str, _timeout: Duration) -> Result<String, ProviderError> {
        let number = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;
        let request = MockRequest {
            prompt: prompt.to_string(),
            model: model.to_string(),
            number,
        };
        self.requests.lock().push(request.clone());

        match self.behavior {
            MockBehavior::Working => Ok(self.respond(&request)),

            MockBehavior::FailFirst { failures, failure } => {
                if number <= failures {
                    Err(failure.to_error(number))
                } else {
                    Ok(self.respond(&request))
                }
            }

            MockBehavior::Intermittent { fail_every } => {
                if fail_every > 0 && number % fail_every == 0 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", number),
                        status_code: 503,
                    })
                } else {
                    Ok(self.respond(&request))
                }
            }

            MockBehavior::Failing(failure) => Err(failure.to_error(number)),

            MockBehavior::Empty => Ok(String::new()),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(self.respond(&request))
            }
        }
    }

    async fn test_connection(&self, _model: &str) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing(failure) => Err(failure.to_error(0)),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "Mock"
    }
}
