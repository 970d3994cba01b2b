/*!
 * Error types for the droneterms application.
 *
 * Provider errors describe a single failed backend call and are always
 * retryable from the point of view of the chunk processor. Extraction errors
 * are job-level outcomes that reach the caller. `AppError` wraps both for the
 * application layer.
 */

use std::time::Duration;

use thiserror::Error;

/// How a failed backend call should influence the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Timeouts, gateway errors, rate limits and anything unrecognised
    Transient,
    /// The response stream ended early, usually because the payload was too large
    Truncation,
}

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The request did not complete within the allotted time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body ended before it was complete
    #[error("Response stream truncated: {0}")]
    StreamTruncated(String),
}

impl ProviderError {
    /// Classify the error for the shrink-and-retry policy
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::StreamTruncated(_) => FailureClass::Truncation,
            Self::RequestFailed(message) | Self::ConnectionError(message)
                if mentions_eof(message) =>
            {
                FailureClass::Truncation
            }
            _ => FailureClass::Transient,
        }
    }
}

fn mentions_eof(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("eof") || lower.contains("truncat") || lower.contains("incomplete")
}

/// Job-level outcomes of an extraction run that are not a glossary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// Nothing to extract from
    #[error("No terms extracted: input text is empty")]
    EmptyInput,

    /// Every chunk exhausted its retry budget
    #[error("No terms extracted: all {0} chunks failed")]
    AllChunksFailed(usize),

    /// The caller cancelled the job between chunks
    #[error("Extraction cancelled after {completed} of {total} chunks")]
    Cancelled {
        /// Chunks finished before cancellation was observed
        completed: usize,
        /// Chunks in the job
        total: usize,
    },
}

impl ExtractionError {
    /// Whether this outcome means the job produced no terms (as opposed to being cancelled)
    pub fn is_no_terms(&self) -> bool {
        matches!(self, Self::EmptyInput | Self::AllChunksFailed(_))
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid or unsupported configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from an extraction job
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
