/*!
 * Prompt construction for chapter translation.
 *
 * The system prompt is the configured style instruction followed by a
 * rendering of the story context, so that names and terms stay consistent
 * across chapters. The user prompt is a fixed instruction and the chunk.
 */

use crate::context::ExtractedContext;

/// Number of most recent plot points included in a translation prompt
pub const PROMPT_PLOT_POINTS: usize = 5;

/// System prompt template with language placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Render the template with the given language names.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

/// Render the story context block appended to the system prompt.
///
/// Returns `None` when the context has nothing to contribute.
pub fn render_context_block(context: &ExtractedContext) -> Option<String> {
    let mut sections: Vec<String> = Vec::new();

    if !context.characters.is_empty() {
        let mut lines = vec!["CHARACTERS:".to_string()];
        for character in &context.characters {
            match &character.personality {
                Some(personality) if !personality.trim().is_empty() => lines.push(format!(
                    "- {}: {} (Personality: {})",
                    character.name, character.description, personality
                )),
                _ => lines.push(format!("- {}: {}", character.name, character.description)),
            }
        }
        sections.push(lines.join("\n"));
    }

    if !context.terms.is_empty() {
        let mut lines = vec!["TERMS:".to_string()];
        lines.extend(context.terms.iter().map(|t| format!("- {}: {}", t.term, t.meaning)));
        sections.push(lines.join("\n"));
    }

    if !context.settings.is_empty() {
        let mut lines = vec!["SETTINGS:".to_string()];
        lines.extend(
            context
                .settings
                .iter()
                .map(|s| format!("- {}: {}", s.location, s.description)),
        );
        sections.push(lines.join("\n"));
    }

    if !context.plot_points.is_empty() {
        let skip = context.plot_points.len().saturating_sub(PROMPT_PLOT_POINTS);
        let mut lines = vec!["KEY PLOT POINTS:".to_string()];
        lines.extend(
            context
                .plot_points
                .iter()
                .skip(skip)
                .map(|p| format!("- {}: {}", p.point, p.description)),
        );
        sections.push(lines.join("\n"));
    }

    if sections.is_empty() {
        return None;
    }

    Some(format!(
        "STORY CONTEXT FROM PREVIOUS CHAPTERS:\n{}\n\n\
Use this information to keep the translation consistent: character names, terms and settings must match.",
        sections.join("\n\n")
    ))
}

/// Builds the prompts of one translation call
#[derive(Debug, Clone)]
pub struct TranslationPromptBuilder {
    template: PromptTemplate,
    source_language: String,
    target_language: String,
    user_instruction: String,
}

impl TranslationPromptBuilder {
    pub fn new(
        template: PromptTemplate,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        user_instruction: impl Into<String>,
    ) -> Self {
        Self {
            template,
            source_language: source_language.into(),
            target_language: target_language.into(),
            user_instruction: user_instruction.into(),
        }
    }

    /// Style instruction plus the rendered context, if any
    pub fn build_system_prompt(&self, context: Option<&ExtractedContext>) -> String {
        let base = self.template.render(&self.source_language, &self.target_language);
        match context.and_then(render_context_block) {
            Some(block) => format!("{}\n\n{}", base, block),
            None => base,
        }
    }

    /// Instruction followed by a blank line and the chunk
    pub fn build_user_prompt(&self, chunk: &str) -> String {
        format!("{}\n\n{}", self.user_instruction.trim_end(), chunk)
    }
}
