/*!
 * Common test utilities for the droneterms test suite
 */

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use droneterms::app_config::{BackendProvider, Config};
use droneterms::errors::ProviderError;
use droneterms::extraction::{
    CancellationFlag, ChunkProcessor, ChunkSplitter, ExtractionPipeline, ModelProfile, RetryPolicy, TokenCounter,
};
use droneterms::providers::Provider;

/// Response of the single-term scenario used across the suite
pub const UAV_RESPONSE: &str =
    "Термин: UAV\nОпределение: unmanned vehicle\nПеревод: БПЛА\nРелевантность: 95%";

/// Route library logs to the test output (`RUST_LOG=debug cargo test`)
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// `count` paragraphs of `len` copies of `ch`, separated by blank lines
pub fn paragraphs(count: usize, len: usize, ch: char) -> String {
    (0..count)
        .map(|_| ch.to_string().repeat(len))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Short retry policy for tests
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(1),
        backoff_ceiling: Duration::from_millis(4),
        request_timeout: Duration::from_secs(5),
        ..RetryPolicy::default()
    }
}

/// Pipeline over a chars/4 token profile
pub fn heuristic_pipeline(
    provider: Arc<dyn Provider>,
    policy: RetryPolicy,
    max_chunk_tokens: usize,
) -> ExtractionPipeline {
    let counter = Arc::new(TokenCounter::new());
    let profile = ModelProfile::heuristic("test-model", 100_000);
    ExtractionPipeline::new(
        ChunkSplitter::new(Arc::clone(&counter), profile.clone()),
        ChunkProcessor::new(provider, counter, profile, policy),
        max_chunk_tokens,
    )
}

/// Config that writes everything under `dir` and retries quickly
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.extraction.provider = BackendProvider::Ollama;
    config.extraction.common.max_retries = 1;
    config.extraction.common.initial_backoff_ms = 1;
    config.extraction.common.backoff_ceiling_ms = 1;
    config.output.results_dir = dir.join("results").to_string_lossy().to_string();
    config.output.term_db_path = dir.join("db").join("db_terms.json").to_string_lossy().to_string();
    config.output.reference_dir = dir.join("reference_terms").to_string_lossy().to_string();
    config
}

/// Backend that stalls on its first `stalls` calls and answers afterwards
#[derive(Debug)]
pub struct StallingProvider {
    stalls: usize,
    stall_for: Duration,
    response: String,
    calls: AtomicUsize,
    prompts: parking_lot::Mutex<Vec<String>>,
}

impl StallingProvider {
    pub fn new(stalls: usize, stall_for: Duration, response: &str) -> Self {
        Self {
            stalls,
            stall_for,
            response: response.to_string(),
            calls: AtomicUsize::new(0),
            prompts: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Provider for StallingProvider {
    async fn submit(&self, prompt: &str, _model: &str, _timeout: Duration) -> Result<String, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        if call < self.stalls {
            tokio::time::sleep(self.stall_for).await;
        }
        Ok(self.response.clone())
    }

    async fn test_connection(&self, _model: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Stalling"
    }
}

/// Backend that answers normally and raises a cancellation flag on its first call
#[derive(Debug)]
pub struct InterruptingProvider {
    cancel: CancellationFlag,
    calls: AtomicUsize,
}

impl InterruptingProvider {
    pub fn new(cancel: CancellationFlag) -> Self {
        Self {
            cancel,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for InterruptingProvider {
    async fn submit(&self, _prompt: &str, _model: &str, _timeout: Duration) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        Ok(UAV_RESPONSE.to_string())
    }

    async fn test_connection(&self, _model: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Interrupting"
    }
}
