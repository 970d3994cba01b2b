/*!
 * Per-chunk request loop.
 *
 * A chunk is submitted to the backend with a timeout. Failed attempts wait an
 * exponentially growing delay, shrink the chunk by a ratio that depends on the
 * failure class, and try again until the retry budget runs out. The processor
 * never returns an error: a chunk that cannot be processed becomes
 * `ChunkResult::Failed` and the job carries on.
 */

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{FailureClass, ProviderError};
use crate::providers::Provider;
use super::chunking::Chunk;
use super::prompts::PromptTemplate;
use super::tokenizer::{ModelProfile, TokenCounter};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").unwrap());

/// Outcome of processing one chunk
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkResult {
    /// Raw backend response, unparsed
    Success(String),
    /// Reason of the last failure after the retry budget was spent
    Failed(String),
}

impl ChunkResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Success(text) => Some(text),
            Self::Failed(_) => None,
        }
    }
}

/// Retry, backoff and shrink settings
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub backoff_ceiling: Duration,
    /// Timeout for one backend call
    pub request_timeout: Duration,
    /// Fraction of words kept after a generic failure
    pub generic_shrink_ratio: f64,
    /// Fraction of words kept after a truncated response
    pub truncation_shrink_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            backoff_ceiling: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            generic_shrink_ratio: 0.9,
            truncation_shrink_ratio: 0.6,
        }
    }
}

impl RetryPolicy {
    /// Ratio of words to keep after a failure of `class`
    pub fn shrink_ratio(&self, class: FailureClass) -> f64 {
        match class {
            FailureClass::Transient => self.generic_shrink_ratio,
            FailureClass::Truncation => self.truncation_shrink_ratio,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let mut delay = self.initial_backoff.min(self.backoff_ceiling);
        for _ in 1..retry {
            delay = delay.saturating_mul(2).min(self.backoff_ceiling);
        }
        delay
    }
}

/// What happened while processing one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkReport {
    /// Chunk index in the job
    pub index: usize,
    /// Final outcome
    pub result: ChunkResult,
    /// Backend calls made
    pub attempts: u32,
    /// Delays waited between attempts, in order
    pub delays: Vec<Duration>,
    /// Token count of the text sent on the last attempt
    pub submitted_tokens: usize,
}

/// Byte offsets where each word of `text` ends
fn word_ends(text: &str) -> Vec<usize> {
    WORD.find_iter(text).map(|m| m.end()).collect()
}

/// Keep the leading `ratio` share of words (at least one)
pub fn shrink_text(text: &str, ratio: f64) -> String {
    let ends = word_ends(text);
    if ends.len() <= 1 {
        return text.to_string();
    }

    let keep = ((ends.len() as f64 * ratio).floor() as usize).clamp(1, ends.len());
    text[..ends[keep - 1]].to_string()
}

/// Sends chunks to one backend with the retry policy
#[derive(Debug, Clone)]
pub struct ChunkProcessor {
    provider: Arc<dyn Provider>,
    counter: Arc<TokenCounter>,
    profile: ModelProfile,
    policy: RetryPolicy,
    prompt: PromptTemplate,
}

impl ChunkProcessor {
    pub fn new(
        provider: Arc<dyn Provider>,
        counter: Arc<TokenCounter>,
        profile: ModelProfile,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            counter,
            profile,
            policy,
            prompt: PromptTemplate::default(),
        }
    }

    /// Use a custom prompt template
    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Process a chunk, returning only the outcome
    pub async fn process(&self, chunk: &Chunk, domain: &str) -> ChunkResult {
        self.process_with_report(chunk, domain).await.result
    }

    /// Process a chunk and report attempts and delays
    pub async fn process_with_report(&self, chunk: &Chunk, domain: &str) -> ChunkReport {
        let mut text = chunk.text().to_string();
        let mut retry: u32 = 0;
        let mut delays = Vec::new();

        loop {
            text = self.fit_to_ceiling(text);
            let submitted_tokens = self.counter.count(&text, &self.profile);
            let prompt = self.prompt.render(domain, &text);

            debug!(
                "Submitting chunk {}/{} ({} tokens, attempt {}/{})",
                chunk.index,
                chunk.total,
                submitted_tokens,
                retry + 1,
                self.policy.max_retries + 1
            );

            let error = match self.submit(&prompt).await {
                Ok(response) => {
                    return ChunkReport {
                        index: chunk.index,
                        result: ChunkResult::Success(response),
                        attempts: retry + 1,
                        delays,
                        submitted_tokens,
                    };
                }
                Err(e) => e,
            };

            if retry >= self.policy.max_retries {
                error!(
                    "Chunk {}/{} failed after {} attempts: {}",
                    chunk.index,
                    chunk.total,
                    retry + 1,
                    error
                );
                return ChunkReport {
                    index: chunk.index,
                    result: ChunkResult::Failed(error.to_string()),
                    attempts: retry + 1,
                    delays,
                    submitted_tokens,
                };
            }

            retry += 1;
            let delay = self.policy.backoff_for(retry);
            let class = error.failure_class();
            warn!(
                "Chunk {}/{} attempt {} failed ({:?}): {}. Retrying in {:?}",
                chunk.index, chunk.total, retry, class, error, delay
            );

            delays.push(delay);
            tokio::time::sleep(delay).await;
            text = shrink_text(&text, self.policy.shrink_ratio(class));
        }
    }

    async fn submit(&self, prompt: &str) -> Result<String, ProviderError> {
        let timeout = self.policy.request_timeout;
        match tokio::time::timeout(timeout, self.provider.submit(prompt, &self.profile.model_id, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        }
    }

    /// Drop trailing words until the text is within the model's safe ceiling
    fn fit_to_ceiling(&self, text: String) -> String {
        let ceiling = self.profile.safe_ceiling;
        let tokens = self.counter.count(&text, &self.profile);
        if tokens <= ceiling {
            return text;
        }

        let ends = word_ends(&text);
        if ends.len() <= 1 {
            warn!("Single word of {} tokens exceeds the {} token ceiling", tokens, ceiling);
            return text;
        }

        // Largest word prefix within the ceiling, never less than one word
        let (mut low, mut high) = (1, ends.len());
        while low < high {
            let mid = (low + high).div_ceil(2);
            if self.counter.count(&text[..ends[mid - 1]], &self.profile) <= ceiling {
                low = mid;
            } else {
                high = mid - 1;
            }
        }

        warn!(
            "Chunk of {} tokens exceeds the {} token ceiling for {}, keeping {} of {} words",
            tokens,
            ceiling,
            self.profile.model_id,
            low,
            ends.len()
        );
        text[..ends[low - 1]].to_string()
    }
}
