/*!
 * Tests for application configuration functionality
 */

use chapterwai::app_config::{Config, LogLevel, ProviderConfig, TranslationProvider};
use std::str::FromStr;
use tempfile::TempDir;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "zh");
    assert_eq!(config.target_language, "vi");
    assert_eq!(config.translation.provider, TranslationProvider::DeepSeek);
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(config.database_path.is_none());

    let deepseek = config
        .translation
        .get_provider_config(&TranslationProvider::DeepSeek)
        .expect("DeepSeek provider config should exist");
    assert_eq!(deepseek.model, "deepseek-chat");
    assert_eq!(deepseek.endpoint, "https://api.deepseek.com");

    let common = &config.translation.common;
    assert_eq!(common.max_chunk_size, 8000);
    assert_eq!(common.chunk_delay_ms, 1000);
    assert_eq!(common.max_tokens, 8000);
    assert!((common.temperature - 0.7).abs() < f32::EPSILON);
    assert_eq!(common.extraction.prefix_chars, 4000);
    assert!((common.extraction.temperature - 0.3).abs() < f32::EPSILON);

    assert_eq!(config.pipeline.chapter_delay_ms, 2000);
    assert_eq!(config.pipeline.max_concurrent_chapters, 4);
    assert_eq!(config.pipeline.retry.max_attempts, 3);
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Mock;
    assert!(config.validate().is_ok());

    // Invalid source language
    config.source_language = "xyz".to_string();
    assert!(config.validate().is_err());
    config.source_language = "zh".to_string();

    // Invalid target language
    config.target_language = "".to_string();
    assert!(config.validate().is_err());
    config.target_language = "vi".to_string();

    // Source and target must differ, whatever code form names them
    config.target_language = "chi".to_string();
    assert!(config.validate().is_err());
    config.target_language = "vi".to_string();

    // Zero-sized chunks are rejected
    config.translation.common.max_chunk_size = 0;
    assert!(config.validate().is_err());
    config.translation.common.max_chunk_size = 8000;

    // So is a pipeline without concurrency or attempts
    config.pipeline.max_concurrent_chapters = 0;
    assert!(config.validate().is_err());
    config.pipeline.max_concurrent_chapters = 2;
    config.pipeline.retry.max_attempts = 0;
    assert!(config.validate().is_err());
    config.pipeline.retry.max_attempts = 3;

    assert!(config.validate().is_ok());
}

/// Test that an API key in the provider entry satisfies validation
#[test]
fn test_config_validation_withConfiguredApiKey_shouldPass() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Anthropic;
    config
        .translation
        .available_providers
        .retain(|p| p.provider_type != "anthropic");
    let mut anthropic = ProviderConfig::new(TranslationProvider::Anthropic);
    anthropic.api_key = "sk-ant-test".to_string();
    config.translation.available_providers.push(anthropic);

    assert!(config.validate().is_ok());
    assert_eq!(config.translation.get_api_key(), "sk-ant-test");
    assert_eq!(config.translation.get_rate_limit(), Some(45));
}

/// Test provider name parsing
#[test]
fn test_translationProvider_fromStr_shouldAcceptKnownNames() {
    assert_eq!(TranslationProvider::from_str("deepseek").unwrap(), TranslationProvider::DeepSeek);
    assert_eq!(TranslationProvider::from_str("OpenAI").unwrap(), TranslationProvider::OpenAI);
    assert_eq!(TranslationProvider::from_str("mock").unwrap(), TranslationProvider::Mock);
    assert!(TranslationProvider::from_str("babelfish").is_err());
    assert_eq!(TranslationProvider::Ollama.to_string(), "ollama");
}

/// Test that a missing config file is created with defaults
#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("conf.json");

    let config = Config::load_or_create(&path).unwrap();

    assert!(path.exists());
    assert_eq!(config.source_language, "zh");
    let reloaded = Config::load(&path).unwrap();
    assert_eq!(reloaded.target_language, config.target_language);
}

/// Test saving and loading a modified config
#[test]
fn test_saveAndLoad_withModifiedConfig_shouldPreserveValues() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    config.source_language = "ja".to_string();
    config.translation.provider = TranslationProvider::Ollama;
    config.pipeline.chapter_delay_ms = 500;
    config.log_level = LogLevel::Debug;
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();

    assert_eq!(loaded.source_language, "ja");
    assert_eq!(loaded.translation.provider, TranslationProvider::Ollama);
    assert_eq!(loaded.pipeline.chapter_delay_ms, 500);
    assert_eq!(loaded.log_level, LogLevel::Debug);
}

/// Test that omitted sections fall back to defaults
#[test]
fn test_load_withPartialFile_shouldFillDefaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf.json");
    std::fs::write(
        &path,
        r#"{
            "source_language": "zh",
            "target_language": "en",
            "translation": { "provider": "mock", "available_providers": [] }
        }"#,
    )
    .unwrap();

    let loaded = Config::load(&path).unwrap();

    assert_eq!(loaded.target_language, "en");
    assert_eq!(loaded.translation.provider, TranslationProvider::Mock);
    assert_eq!(loaded.translation.get_model(), "mock");
    assert_eq!(loaded.pipeline.chapter_delay_ms, 2000);
    assert!(loaded.validate().is_ok());
}

/// Test that malformed JSON is reported
#[test]
fn test_load_withInvalidJson_shouldFail() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Config::load(&path).is_err());
}

/// Test the database location override
#[test]
fn test_databaseFile_withOverride_shouldUseIt() {
    let mut config = Config::default();
    config.database_path = Some("/tmp/chapters.db".to_string());
    assert_eq!(config.database_file().unwrap(), std::path::PathBuf::from("/tmp/chapters.db"));
}

/// Test retry settings conversion
#[test]
fn test_retryConfig_toPolicy_shouldKeepAttempts() {
    let config = Config::default();
    let policy = config.pipeline.retry.to_policy();
    assert_eq!(policy.max_attempts(), 3);
}

/// Test log level conversion
#[test]
fn test_logLevel_toLevelFilter_shouldMapEachLevel() {
    assert_eq!(LogLevel::Error.to_level_filter(), log::LevelFilter::Error);
    assert_eq!(LogLevel::Info.to_level_filter(), log::LevelFilter::Info);
    assert_eq!(LogLevel::Trace.to_level_filter(), log::LevelFilter::Trace);
}
