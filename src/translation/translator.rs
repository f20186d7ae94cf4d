/*!
 * Context-aware chapter translation.
 *
 * One completion call per chunk. Chunks of a text are translated strictly in
 * order against the same context snapshot, with a fixed pause between calls.
 * The first failing chunk fails the whole text and no partial result is kept.
 */

use anyhow::Result;
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::chunker::{self, PARAGRAPH_SEPARATOR};
use super::prompts::{PromptTemplate, TranslationPromptBuilder};
use super::usage::TokenUsageStats;
use crate::app_config::Config;
use crate::context::ExtractedContext;
use crate::errors::ProviderError;
use crate::language_utils;
use crate::providers::{CompletionProvider, CompletionRequest, TokenUsage};

/// Translator tuning, usually derived from [`Config`]
#[derive(Debug, Clone)]
pub struct TranslatorSettings {
    /// Language names as they appear in prompts
    pub source_language: String,
    pub target_language: String,
    pub system_prompt: String,
    pub user_instruction: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_chunk_size: usize,
    /// Pause between two chunk calls of the same text
    pub chunk_delay: Duration,
}

impl TranslatorSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let common = &config.translation.common;
        Ok(Self {
            source_language: language_utils::get_language_name(&config.source_language)?,
            target_language: language_utils::get_language_name(&config.target_language)?,
            system_prompt: common.system_prompt.clone(),
            user_instruction: common.user_instruction.clone(),
            temperature: common.temperature,
            max_tokens: common.max_tokens,
            max_chunk_size: common.max_chunk_size,
            chunk_delay: Duration::from_millis(common.chunk_delay_ms),
        })
    }
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        let common = crate::app_config::TranslationCommonConfig::default();
        Self {
            source_language: "Chinese".to_string(),
            target_language: "Vietnamese".to_string(),
            system_prompt: common.system_prompt,
            user_instruction: common.user_instruction,
            temperature: common.temperature,
            max_tokens: common.max_tokens,
            max_chunk_size: common.max_chunk_size,
            chunk_delay: Duration::from_millis(common.chunk_delay_ms),
        }
    }
}

/// Result of translating one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkTranslation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Result of translating a whole text
#[derive(Debug, Clone)]
pub struct LongTextTranslation {
    /// Translated chunks joined by a blank line
    pub text: String,
    pub chunk_count: usize,
    pub usage: TokenUsageStats,
}

/// Translates chunks and whole chapters through a completion provider
#[derive(Debug, Clone)]
pub struct Translator {
    provider: Arc<dyn CompletionProvider>,
    prompts: TranslationPromptBuilder,
    settings: TranslatorSettings,
}

impl Translator {
    pub fn new(provider: Arc<dyn CompletionProvider>, settings: TranslatorSettings) -> Self {
        let prompts = TranslationPromptBuilder::new(
            PromptTemplate::new(&settings.system_prompt),
            settings.source_language.clone(),
            settings.target_language.clone(),
            settings.user_instruction.clone(),
        );
        Self {
            provider,
            prompts,
            settings,
        }
    }

    pub fn settings(&self) -> &TranslatorSettings {
        &self.settings
    }

    /// The completion request sent for `chunk`
    pub fn build_request(&self, chunk: &str, context: Option<&ExtractedContext>, model: &str) -> CompletionRequest {
        CompletionRequest::new(
            model,
            self.prompts.build_system_prompt(context),
            self.prompts.build_user_prompt(chunk),
        )
        .temperature(self.settings.temperature)
        .max_tokens(self.settings.max_tokens)
    }

    /// Translate a single chunk.
    ///
    /// The response is trimmed; a blank response is an error.
    pub async fn translate(
        &self,
        chunk: &str,
        context: Option<&ExtractedContext>,
        model: &str,
    ) -> Result<ChunkTranslation, ProviderError> {
        let request = self.build_request(chunk, context, model);
        let completion = self.provider.complete(request).await?;

        let text = completion.text.trim();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(ChunkTranslation {
            text: text.to_string(),
            usage: completion.usage,
        })
    }

    /// Chunk `text` and translate the chunks sequentially
    pub async fn translate_long_text(
        &self,
        text: &str,
        context: Option<&ExtractedContext>,
        model: &str,
    ) -> Result<LongTextTranslation, ProviderError> {
        let chunks = chunker::split(text, self.settings.max_chunk_size);
        let total = chunks.len();
        let mut usage = TokenUsageStats::with_provider_info(self.provider.name().to_string(), model.to_string());
        let mut translated = Vec::with_capacity(total);

        for (index, chunk) in chunks.iter().enumerate() {
            info!("Translating chunk {}/{} ({} chars)", index + 1, total, chunk.chars().count());
            let started = Instant::now();
            let result = self.translate(chunk, context, model).await?;
            let elapsed = started.elapsed();
            debug!("Chunk {}/{} translated in {:.2}s", index + 1, total, elapsed.as_secs_f64());

            usage.record(result.usage, elapsed);
            translated.push(result.text);

            if index + 1 < total && !self.settings.chunk_delay.is_zero() {
                tokio::time::sleep(self.settings.chunk_delay).await;
            }
        }

        Ok(LongTextTranslation {
            text: translated.join(PARAGRAPH_SEPARATOR),
            chunk_count: total,
            usage,
        })
    }
}
