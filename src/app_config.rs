use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};

use crate::pipeline::retry::RetryPolicy;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    pub source_language: String,

    /// Target language code (ISO)
    pub target_language: String,

    /// Translation config
    pub translation: TranslationConfig,

    /// Job execution settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// SQLite database file; the user data directory is used when unset
    #[serde(default)]
    pub database_path: Option<String>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: DeepSeek (OpenAI-compatible)
    #[default]
    DeepSeek,
    // @provider: OpenAI
    OpenAI,
    // @provider: Anthropic
    Anthropic,
    // @provider: Ollama
    Ollama,
    // @provider: Offline mock, echoes its input
    Mock,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::DeepSeek => "DeepSeek",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Ollama => "Ollama",
            Self::Mock => "Mock",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::DeepSeek => "deepseek".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::Ollama => "ollama".to_string(),
            Self::Mock => "mock".to_string(),
        }
    }

    // @returns: Environment variable holding the API key, if the provider needs one
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self {
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama | Self::Mock => None,
        }
    }
}

// Implement Display trait for TranslationProvider
impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

// Implement FromStr trait for TranslationProvider
impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "deepseek" => Ok(Self::DeepSeek),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
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

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Rate limit (requests per minute)
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        Self {
            provider_type: provider_type.to_lowercase_string(),
            model: default_model(provider_type),
            api_key: String::new(),
            endpoint: default_endpoint(provider_type),
            timeout_secs: default_timeout_secs(),
            rate_limit: default_rate_limit(provider_type),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Style and persona instruction for translation
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Instruction placed in front of every chunk
    #[serde(default = "default_user_instruction")]
    pub user_instruction: String,

    /// Temperature parameter for translation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum completion tokens per translation call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum characters per chunk
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Delay in milliseconds between consecutive chunk requests
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Context extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            user_instruction: default_user_instruction(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_chunk_size: default_max_chunk_size(),
            chunk_delay_ms: default_chunk_delay_ms(),
            extraction: ExtractionConfig::default(),
        }
    }
}

/// Narrative context extraction settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// System prompt describing the JSON shape to return
    #[serde(default = "default_extraction_prompt")]
    pub system_prompt: String,

    /// Only this many leading characters of a chapter are analyzed
    #[serde(default = "default_extraction_prefix_chars")]
    pub prefix_chars: usize,

    #[serde(default = "default_extraction_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_extraction_prompt(),
            prefix_chars: default_extraction_prefix_chars(),
            temperature: default_extraction_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Job execution settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Stagger between chapter starts in a batch, in milliseconds
    #[serde(default = "default_chapter_delay_ms")]
    pub chapter_delay_ms: u64,

    /// Chapters of different stories processed at the same time
    #[serde(default = "default_max_concurrent_chapters")]
    pub max_concurrent_chapters: usize,

    /// Step retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Age after which a `translating` chapter is considered abandoned
    #[serde(default = "default_stuck_ttl_secs")]
    pub stuck_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chapter_delay_ms: default_chapter_delay_ms(),
            max_concurrent_chapters: default_max_concurrent_chapters(),
            retry: RetryConfig::default(),
            stuck_ttl_secs: default_stuck_ttl_secs(),
        }
    }
}

/// Retry settings shared by every pipeline step
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per step, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Randomize backoffs by up to +/-25%
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_retry_backoff_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            std::time::Duration::from_millis(self.base_delay_ms),
            std::time::Duration::from_millis(self.max_delay_ms),
        )
        .with_jitter(self.jitter)
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    8000
}

fn default_max_chunk_size() -> usize {
    crate::translation::chunker::DEFAULT_MAX_CHUNK_SIZE
}

fn default_chunk_delay_ms() -> u64 {
    1000
}

fn default_extraction_prefix_chars() -> usize {
    4000
}

fn default_extraction_temperature() -> f32 {
    0.3
}

fn default_chapter_delay_ms() -> u64 {
    2000
}

fn default_max_concurrent_chapters() -> usize {
    4
}

fn default_stuck_ttl_secs() -> u64 {
    30 * 60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_endpoint(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::DeepSeek => "https://api.deepseek.com".to_string(),
        TranslationProvider::OpenAI => "https://api.openai.com/v1".to_string(),
        TranslationProvider::Anthropic => "https://api.anthropic.com".to_string(),
        TranslationProvider::Ollama => "http://localhost:11434".to_string(),
        TranslationProvider::Mock => String::new(),
    }
}

fn default_model(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::DeepSeek => "deepseek-chat".to_string(),
        TranslationProvider::OpenAI => "gpt-4o-mini".to_string(),
        TranslationProvider::Anthropic => "claude-3-5-haiku-latest".to_string(),
        TranslationProvider::Ollama => "qwen2.5".to_string(),
        TranslationProvider::Mock => "mock".to_string(),
    }
}

fn default_rate_limit(provider: TranslationProvider) -> Option<u32> {
    match provider {
        TranslationProvider::DeepSeek | TranslationProvider::OpenAI => Some(60),
        // slightly below Anthropic's 50 requests per minute
        TranslationProvider::Anthropic => Some(45),
        TranslationProvider::Ollama | TranslationProvider::Mock => None,
    }
}

fn default_system_prompt() -> String {
    "You are a professional literary translator of serialized web fiction. \
Translate from {source_language} to {target_language}.\n\
- Keep every plot detail, the world's rules, cultivation ranks and techniques.\n\
- Write fluent, natural prose as if originally written in {target_language}; avoid word-by-word translation.\n\
- Keep established names and terms exactly as defined in the story context.\n\
- Keep paragraph breaks; put each line of dialogue on its own line.\n\
- Do not add translator notes or commentary."
        .to_string()
}

fn default_user_instruction() -> String {
    "Translate and edit the following passage according to the guidelines above:".to_string()
}

fn default_extraction_prompt() -> String {
    "You analyze chapters of serialized fiction to build a knowledge base for translating later chapters.\n\
Extract:\n\
1. Characters: name, short description, personality (if known)\n\
2. Terms: special words, techniques, artifacts, ranks\n\
3. Settings: locations that appear\n\
4. Plot points: the important events of the chapter\n\
Return a JSON object of the form:\n\
{\"characters\": [{\"name\": \"...\", \"description\": \"...\", \"personality\": \"...\"}], \
\"terms\": [{\"term\": \"...\", \"meaning\": \"...\"}], \
\"settings\": [{\"location\": \"...\", \"description\": \"...\"}], \
\"plotPoints\": [{\"point\": \"...\", \"description\": \"...\"}]}"
        .to_string()
}

impl Config {
    /// Load a configuration file, creating it with defaults when missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save(path)?;
            log::info!("Created default configuration at {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        // Validate languages
        let _source_name = crate::language_utils::get_language_name(&self.source_language)?;
        let _target_name = crate::language_utils::get_language_name(&self.target_language)?;
        if crate::language_utils::language_codes_match(&self.source_language, &self.target_language) {
            return Err(anyhow!(
                "Source and target language are the same ({} / {})",
                self.source_language,
                self.target_language
            ));
        }

        if let Some(env_var) = self.translation.provider.api_key_env_var() {
            if self.translation.get_api_key().is_empty() {
                return Err(anyhow!(
                    "Translation API key is required for {} provider (set it in the config or {})",
                    self.translation.provider.display_name(),
                    env_var
                ));
            }
        }

        crate::providers::normalize_endpoint(&self.translation.get_endpoint())
            .with_context(|| format!("Invalid endpoint for {} provider", self.translation.provider.display_name()))?;

        if self.translation.common.max_chunk_size == 0 {
            return Err(anyhow!("max_chunk_size must be greater than 0"));
        }
        if self.pipeline.max_concurrent_chapters == 0 {
            return Err(anyhow!("max_concurrent_chapters must be greater than 0"));
        }
        if self.pipeline.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }

        Ok(())
    }

    /// Resolve the database file location
    pub fn database_file(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => crate::database::connection::DatabaseConnection::default_path(),
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "zh".to_string(),
            target_language: "vi".to_string(),
            translation: TranslationConfig::default(),
            pipeline: PipelineConfig::default(),
            database_path: None,
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers
            .iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        // Default fallback based on provider type
        default_model(self.provider)
    }

    /// Get the API key for the active provider, falling back to the
    /// provider's environment variable
    pub fn get_api_key(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.api_key.is_empty() {
                return provider_config.api_key.clone();
            }
        }

        self.provider
            .api_key_env_var()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        // Default fallback based on provider type
        default_endpoint(self.provider)
    }

    /// Get the request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or_else(default_timeout_secs)
    }

    /// Get the rate limit for the active provider
    pub fn get_rate_limit(&self) -> Option<u32> {
        if let Some(provider_config) = self.get_active_provider_config() {
            return provider_config.rate_limit;
        }

        // Default fallback based on provider type
        default_rate_limit(self.provider)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::DeepSeek),
                ProviderConfig::new(TranslationProvider::OpenAI),
                ProviderConfig::new(TranslationProvider::Anthropic),
                ProviderConfig::new(TranslationProvider::Ollama),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}
