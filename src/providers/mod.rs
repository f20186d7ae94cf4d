/*!
 * Completion providers.
 *
 * This module contains client implementations for the LLM services the
 * pipeline can talk to:
 * - OpenAI-compatible chat completions (DeepSeek by default, OpenAI)
 * - Anthropic: Anthropic messages API
 * - Ollama: Local LLM server
 * - Mock: deterministic provider for tests and dry runs
 *
 * Every client performs exactly one HTTP attempt per call. Retries belong to
 * the pipeline, pacing and deadlines to [`LimitedProvider`].
 */

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

pub mod anthropic;
pub mod limiter;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use limiter::{LimitedProvider, RateLimiter};

/// Requested shape of the completion text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Ask the service to return a single JSON object
    JsonObject,
}

/// Provider-neutral completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: 8000,
            response_format: ResponseFormat::Text,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }
}

/// Token counts reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Completion result
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Common trait for all completion providers
///
/// Implementations are used interchangeably by the translator and the
/// context extractor.
#[async_trait]
pub trait CompletionProvider: Send + Sync + Debug {
    /// Complete a request with a single attempt
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;

    /// Short provider name for logs
    fn name(&self) -> &str;
}

#[async_trait]
impl<P: CompletionProvider + ?Sized> CompletionProvider for Arc<P> {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        (**self).complete(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Map a reqwest failure into the provider error taxonomy
pub(crate) fn map_request_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else if error.is_connect() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

/// Check a configured endpoint and give it a scheme if it has none.
///
/// An empty endpoint stays empty so clients fall back to their default.
pub fn normalize_endpoint(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Ok(String::new());
    }

    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Url::parse(endpoint)?
    } else {
        Url::parse(&format!("http://{}", endpoint))?
    };

    if url.host_str().is_none() {
        return Err(anyhow!("Invalid host in endpoint: {}", endpoint));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Build the configured provider, wrapped with the shared rate limiter and
/// request timeout
pub fn build_provider(config: &TranslationConfig) -> Result<Arc<dyn CompletionProvider>> {
    let timeout = Duration::from_secs(config.get_timeout_secs());
    let api_key = config.get_api_key();
    let endpoint = normalize_endpoint(&config.get_endpoint())?;

    let inner: Arc<dyn CompletionProvider> = match config.provider {
        TranslationProvider::DeepSeek | TranslationProvider::OpenAI => {
            if api_key.is_empty() {
                return Err(anyhow!("No API key configured for {}", config.provider.display_name()));
            }
            Arc::new(openai::OpenAI::new(api_key, endpoint, timeout))
        }
        TranslationProvider::Anthropic => {
            if api_key.is_empty() {
                return Err(anyhow!("No API key configured for Anthropic"));
            }
            Arc::new(anthropic::Anthropic::new(api_key, endpoint, timeout))
        }
        TranslationProvider::Ollama => Arc::new(ollama::Ollama::new(endpoint, timeout)),
        TranslationProvider::Mock => Arc::new(mock::MockProvider::working()),
    };

    log::debug!(
        "Using {} provider (timeout {:?}, rate limit {:?} rpm)",
        config.provider.display_name(),
        timeout,
        config.get_rate_limit()
    );

    let limiter = Arc::new(RateLimiter::per_minute(config.get_rate_limit()));
    Ok(Arc::new(LimitedProvider::new(inner, limiter, timeout)))
}
