use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::Path;
use std::time::Duration;

use crate::extraction::{ModelProfile, PromptTemplate, RetryPolicy};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Subject area the extracted terms should belong to
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Extraction config
    pub extraction: ExtractionConfig,

    /// Text cleaning config
    #[serde(default)]
    pub cleaning: CleaningConfig,

    /// Where results go
    #[serde(default)]
    pub output: OutputConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Extraction backend type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    // @provider: OpenAI-compatible chat completions (OpenAI, DeepSeek, proxies)
    #[default]
    OpenAI,
    // @provider: Ollama
    Ollama,
}

impl BackendProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Ollama => "Ollama",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::OpenAI => "openai".to_string(),
            Self::Ollama => "ollama".to_string(),
        }
    }
}

impl std::fmt::Display for BackendProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for BackendProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds per request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Token budget per chunk, model default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunk_tokens: Option<usize>,

    // @field: Context window override, model default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_limit: Option<usize>,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: BackendProvider) -> Self {
        match provider_type {
            BackendProvider::OpenAI => Self {
                provider_type: "openai".to_string(),
                model: default_openai_model(),
                api_key: String::new(),
                endpoint: default_openai_endpoint(),
                timeout_secs: default_timeout_secs(),
                max_chunk_tokens: None,
                context_limit: None,
            },
            BackendProvider::Ollama => Self {
                provider_type: "ollama".to_string(),
                model: default_ollama_model(),
                api_key: String::new(),
                endpoint: default_ollama_endpoint(),
                timeout_secs: default_ollama_timeout_secs(),
                max_chunk_tokens: None,
                context_limit: None,
            },
        }
    }
}

/// Extraction service configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Extraction backend to use
    #[serde(default)]
    pub provider: BackendProvider,

    /// Available backends
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common extraction settings
    #[serde(default)]
    pub common: ExtractionCommonConfig,
}

/// Common extraction settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExtractionCommonConfig {
    /// Prompt template for extraction
    /// Placeholders: {domain}, {text}
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// Retry count for failed chunks
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, doubled on each retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single retry delay
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,

    /// Minimum relevance (percent) for a term to enter the term database
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,

    /// Share of words kept after a generic failure
    #[serde(default = "default_generic_shrink_ratio")]
    pub generic_shrink_ratio: f64,

    /// Share of words kept after a truncated response
    #[serde(default = "default_truncation_shrink_ratio")]
    pub truncation_shrink_ratio: f64,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ExtractionCommonConfig {
    fn default() -> Self {
        Self {
            prompt_template: default_prompt_template(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_ceiling_ms: default_backoff_ceiling_ms(),
            relevance_threshold: default_relevance_threshold(),
            generic_shrink_ratio: default_generic_shrink_ratio(),
            truncation_shrink_ratio: default_truncation_shrink_ratio(),
            temperature: default_temperature(),
        }
    }
}

/// Configuration for text cleaning
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CleaningConfig {
    /// Whether to clean input text before splitting
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Configuration for result files
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// Root directory for exported results
    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    /// JSON term database path
    #[serde(default = "default_term_db_path")]
    pub term_db_path: String,

    /// Directory holding `<document stem>.txt` reference term lists
    #[serde(default = "default_reference_dir")]
    pub reference_dir: String,

    /// Whether to export a CSV per document
    #[serde(default = "default_true")]
    pub save_csv: bool,

    /// Whether to store relevant terms in the term database
    #[serde(default = "default_true")]
    pub save_term_db: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            term_db_path: default_term_db_path(),
            reference_dir: default_reference_dir(),
            save_csv: true,
            save_term_db: true,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Flat settings of the active provider, as used by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    pub model_id: String,
    pub model_context_limit: usize,
    pub max_chunk_tokens: usize,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_ceiling: Duration,
    pub relevance_threshold: f64,
    pub generic_shrink_ratio: f64,
    pub truncation_shrink_ratio: f64,
}

impl ExtractionSettings {
    /// Token profile of the configured model
    pub fn profile(&self) -> ModelProfile {
        ModelProfile::for_model(&self.model_id).with_context_limit(self.model_context_limit)
    }

    /// Retry policy for the chunk processor
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
            backoff_ceiling: self.backoff_ceiling,
            request_timeout: self.request_timeout,
            generic_shrink_ratio: self.generic_shrink_ratio,
            truncation_shrink_ratio: self.truncation_shrink_ratio,
        }
    }
}

fn default_domain() -> String {
    PromptTemplate::DEFAULT_DOMAIN.to_string()
}

fn default_prompt_template() -> String {
    PromptTemplate::TERM_EXTRACTOR.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_ollama_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    2000
}

fn default_backoff_ceiling_ms() -> u64 {
    30_000
}

fn default_relevance_threshold() -> f64 {
    80.0
}

fn default_generic_shrink_ratio() -> f64 {
    0.9
}

fn default_truncation_shrink_ratio() -> f64 {
    0.6
}

fn default_temperature() -> f32 {
    0.3
}

fn default_true() -> bool {
    true
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_term_db_path() -> String {
    "db/db_terms.json".to_string()
}

fn default_reference_dir() -> String {
    "reference_terms".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

/// Default chunk budget: a quarter of the safe ceiling, capped at 4000 tokens
fn default_max_chunk_tokens(profile: &ModelProfile) -> usize {
    (profile.safe_ceiling / 4).clamp(1, 4000)
}

impl Config {
    /// Load a configuration file, writing a default one when it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            log::warn!("Config file not found at '{}', creating default config.", path.display());
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(anyhow!("Domain must not be empty"));
        }

        if self.extraction.provider == BackendProvider::OpenAI
            && self.extraction.get_api_key().is_empty()
        {
            return Err(anyhow!("API key is required for the OpenAI provider"));
        }

        let common = &self.extraction.common;
        if !PromptTemplate::new(&common.prompt_template).has_text_placeholder() {
            return Err(anyhow!("Prompt template must contain a {{text}} placeholder"));
        }

        for (name, ratio) in [
            ("generic_shrink_ratio", common.generic_shrink_ratio),
            ("truncation_shrink_ratio", common.truncation_shrink_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(anyhow!("{} must be in (0, 1], got {}", name, ratio));
            }
        }

        if !(0.0..=100.0).contains(&common.relevance_threshold) {
            return Err(anyhow!(
                "relevance_threshold must be in [0, 100], got {}",
                common.relevance_threshold
            ));
        }

        if common.backoff_ceiling_ms < common.initial_backoff_ms {
            return Err(anyhow!("backoff_ceiling_ms must not be below initial_backoff_ms"));
        }

        let settings = self.extraction.settings();
        let profile = settings.profile();
        if settings.max_chunk_tokens == 0 || settings.max_chunk_tokens > profile.safe_ceiling {
            return Err(anyhow!(
                "max_chunk_tokens must be between 1 and {} for {}, got {}",
                profile.safe_ceiling,
                settings.model_id,
                settings.max_chunk_tokens
            ));
        }

        if settings.request_timeout.is_zero() {
            return Err(anyhow!("timeout_secs must be positive"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            domain: default_domain(),
            extraction: ExtractionConfig::default(),
            cleaning: CleaningConfig::default(),
            output: OutputConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl ExtractionConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Mutable access to the active provider configuration, created on demand
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        let position = self
            .available_providers
            .iter()
            .position(|p| p.provider_type == provider_str);

        match position {
            Some(index) => &mut self.available_providers[index],
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider));
                let last = self.available_providers.len() - 1;
                &mut self.available_providers[last]
            }
        }
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &BackendProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        match self.provider {
            BackendProvider::OpenAI => default_openai_model(),
            BackendProvider::Ollama => default_ollama_model(),
        }
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        match self.provider {
            BackendProvider::OpenAI => default_openai_endpoint(),
            BackendProvider::Ollama => default_ollama_endpoint(),
        }
    }

    /// Get the request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .unwrap_or_else(default_timeout_secs)
    }

    /// Flatten the active provider and common settings
    pub fn settings(&self) -> ExtractionSettings {
        let model_id = self.get_model();
        let provider_config = self.get_active_provider_config();

        let mut profile = ModelProfile::for_model(&model_id);
        if let Some(limit) = provider_config.and_then(|p| p.context_limit) {
            profile = profile.with_context_limit(limit);
        }
        let max_chunk_tokens = provider_config
            .and_then(|p| p.max_chunk_tokens)
            .unwrap_or_else(|| default_max_chunk_tokens(&profile));

        ExtractionSettings {
            model_id,
            model_context_limit: profile.context_limit,
            max_chunk_tokens,
            request_timeout: Duration::from_secs(self.get_timeout_secs()),
            max_retries: self.common.max_retries,
            initial_backoff: Duration::from_millis(self.common.initial_backoff_ms),
            backoff_ceiling: Duration::from_millis(self.common.backoff_ceiling_ms),
            relevance_threshold: self.common.relevance_threshold,
            generic_shrink_ratio: self.common.generic_shrink_ratio,
            truncation_shrink_ratio: self.common.truncation_shrink_ratio,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: BackendProvider::default(),
            available_providers: vec![
                ProviderConfig::new(BackendProvider::OpenAI),
                ProviderConfig::new(BackendProvider::Ollama),
            ],
            common: ExtractionCommonConfig::default(),
        }
    }
}
