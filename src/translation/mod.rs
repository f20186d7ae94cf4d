/*!
 * Chapter translation through completion providers.
 *
 * - `chunker`: paragraph-aware splitting of long text
 * - `prompts`: prompt templates and the story context block
 * - `translator`: chunk and long-text translation
 * - `usage`: token usage accounting
 */

pub mod chunker;
pub mod prompts;
pub mod translator;
pub mod usage;

pub use self::prompts::{PromptTemplate, TranslationPromptBuilder, PROMPT_PLOT_POINTS};
pub use self::translator::{ChunkTranslation, LongTextTranslation, Translator, TranslatorSettings};
pub use self::usage::TokenUsageStats;
