/*!
 * Best-effort narrative context extraction.
 *
 * A bounded prefix of a translated chapter is sent to the completion service
 * with a request for a JSON object. Any failure yields an empty context from
 * [`ContextExtractor::extract`]; [`ContextExtractor::try_extract`] exposes the
 * error for callers that record it.
 */

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use super::merger::{merge_contexts, window_plot_points};
use super::model::ExtractedContext;
use crate::app_config::ExtractionConfig;
use crate::errors::PipelineError;
use crate::providers::{CompletionProvider, CompletionRequest, ResponseFormat, TokenUsage};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").expect("code fence regex is valid")
});

/// Extraction result with the provider's token counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub context: ExtractedContext,
    pub usage: Option<TokenUsage>,
}

/// Extracts characters, terms, settings and plot points from chapter text
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    provider: Arc<dyn CompletionProvider>,
    config: ExtractionConfig,
}

impl ContextExtractor {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: ExtractionConfig) -> Self {
        Self { provider, config }
    }

    /// Leading `prefix_chars` characters of `text`
    pub fn prefix<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.config.prefix_chars) {
            Some((byte_index, _)) => &text[..byte_index],
            None => text,
        }
    }

    pub fn build_request(&self, translated_text: &str, model: &str) -> CompletionRequest {
        CompletionRequest::new(
            model,
            self.config.system_prompt.clone(),
            format!(
                "Analyze the following chapter and extract its information:\n\n{}",
                self.prefix(translated_text)
            ),
        )
        .temperature(self.config.temperature)
        .max_tokens(self.config.max_tokens)
        .response_format(ResponseFormat::JsonObject)
    }

    /// Extract context, returning an empty context on any failure
    pub async fn extract(&self, translated_text: &str, model: &str) -> ExtractedContext {
        match self.try_extract(translated_text, model).await {
            Ok(extraction) => extraction.context,
            Err(e) => {
                warn!("Context extraction failed, continuing without it: {}", e);
                ExtractedContext::empty()
            }
        }
    }

    /// Extract context, surfacing API and parse errors
    pub async fn try_extract(&self, translated_text: &str, model: &str) -> Result<Extraction, PipelineError> {
        if translated_text.trim().is_empty() {
            return Ok(Extraction::default());
        }

        let completion = self
            .provider
            .complete(self.build_request(translated_text, model))
            .await?;

        if let Some(usage) = completion.usage {
            debug!(
                "Context extraction token usage - input: {}, output: {}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        let context = parse_extraction(&completion.text)?;
        Ok(Extraction {
            context,
            usage: completion.usage,
        })
    }
}

/// Parse the model's JSON answer into a normalized context.
///
/// Tolerates markdown code fences and missing lists. Entries with a blank
/// identity are dropped, duplicate keys collapse as in a merge, and plot
/// points are windowed.
pub fn parse_extraction(response: &str) -> Result<ExtractedContext, PipelineError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Extraction("empty response".to_string()));
    }

    let body = match CODE_FENCE.captures(trimmed) {
        Some(captures) => captures.get(1).map_or(trimmed, |m| m.as_str()),
        None => trimmed,
    };

    let mut parsed: ExtractedContext = serde_json::from_str(body)
        .map_err(|e| PipelineError::Extraction(format!("unparseable response: {}", e)))?;

    parsed.characters.retain(|c| !c.name.trim().is_empty());
    parsed.terms.retain(|t| !t.term.trim().is_empty());
    parsed.settings.retain(|s| !s.location.trim().is_empty());
    parsed.plot_points.retain(|p| !p.point.trim().is_empty());
    for character in parsed.characters.iter_mut() {
        if character.personality.as_deref().is_some_and(|p| p.trim().is_empty()) {
            character.personality = None;
        }
    }
    window_plot_points(&mut parsed.plot_points);

    Ok(merge_contexts(&ExtractedContext::empty(), parsed))
}
