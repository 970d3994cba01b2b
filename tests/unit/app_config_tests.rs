/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;
use std::time::Duration;

use droneterms::app_config::{BackendProvider, Config, LogLevel};
use droneterms::extraction::TokenEncoding;
use crate::common;

/// Test default configuration values
#[test]
fn test_defaultConfig_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.extraction.provider, BackendProvider::OpenAI);
    assert_eq!(config.extraction.get_model(), "gpt-4o");
    assert_eq!(config.extraction.get_endpoint(), "https://api.openai.com/v1");
    assert_eq!(config.extraction.common.max_retries, 3);
    assert_eq!(config.extraction.common.relevance_threshold, 80.0);
    assert_eq!(config.output.term_db_path, "db/db_terms.json");
    assert!(config.cleaning.enabled);
    assert_eq!(config.log_level, LogLevel::Info);
}

/// Settings resolve the model profile and retry policy of the active provider
#[test]
fn test_settings_gpt4o_shouldUseLargeContext() {
    let settings = Config::default().extraction.settings();
    let profile = settings.profile();

    assert_eq!(profile.encoding, TokenEncoding::O200kBase);
    assert_eq!(profile.context_limit, 128_000);
    assert_eq!(settings.max_chunk_tokens, 4000);
    assert_eq!(settings.request_timeout, Duration::from_secs(120));

    let policy = settings.retry_policy();
    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.initial_backoff, Duration::from_millis(2000));
    assert_eq!(policy.backoff_ceiling, Duration::from_secs(30));
}

/// Chunk budgets above the safe ceiling are rejected
#[test]
fn test_validate_chunkBudgetAboveCeiling_shouldFail() {
    let mut config = Config::default();
    config.extraction.provider = BackendProvider::Ollama;
    config.extraction.active_provider_config_mut().context_limit = Some(8192);
    config.extraction.active_provider_config_mut().max_chunk_tokens = Some(7000);

    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("max_chunk_tokens"));

    config.extraction.active_provider_config_mut().max_chunk_tokens = Some(3000);
    assert!(config.validate().is_ok());
}

/// Invalid ratios and thresholds are rejected
#[test]
fn test_validate_invalidCommonSettings_shouldFail() {
    let mut config = Config::default();
    config.extraction.provider = BackendProvider::Ollama;
    assert!(config.validate().is_ok());

    config.extraction.common.truncation_shrink_ratio = 0.0;
    assert!(config.validate().is_err());
    config.extraction.common.truncation_shrink_ratio = 0.6;

    config.extraction.common.relevance_threshold = 120.0;
    assert!(config.validate().is_err());
    config.extraction.common.relevance_threshold = 80.0;

    config.extraction.common.prompt_template = "Термины: {domain}".to_string();
    assert!(config.validate().is_err());
}

/// A missing config file is created with defaults and loads back unchanged
#[test]
fn test_loadOrCreate_missingFile_shouldWriteDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let created = Config::load_or_create(&path)?;
    assert!(path.exists());

    let loaded = Config::load_or_create(&path)?;
    assert_eq!(created, loaded);
    Ok(())
}

/// Partial config files fall back to defaults for missing sections
#[test]
fn test_loadOrCreate_partialFile_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{
            "domain": "авиационной метеорологией",
            "extraction": {
                "provider": "ollama",
                "available_providers": [
                    { "type": "ollama", "model": "qwen2.5:14b", "max_chunk_tokens": 1500 }
                ]
            },
            "log_level": "debug"
        }"#,
    )?;

    let config = Config::load_or_create(&path)?;
    assert_eq!(config.domain, "авиационной метеорологией");
    assert_eq!(config.extraction.get_model(), "qwen2.5:14b");
    assert_eq!(config.extraction.settings().max_chunk_tokens, 1500);
    assert_eq!(config.extraction.common.max_retries, 3);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.validate().is_ok());
    Ok(())
}
