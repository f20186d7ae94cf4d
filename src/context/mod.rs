/*!
 * Narrative context shared across the chapters of a story.
 *
 * - `model`: characters, terms, settings and plot points
 * - `merger`: pure merge of an existing context with a newly extracted one
 * - `extractor`: best-effort extraction of context from a translated chapter
 */

pub mod extractor;
pub mod merger;
pub mod model;

pub use extractor::{parse_extraction, ContextExtractor, Extraction};
pub use merger::{merge, merge_contexts};
pub use model::{
    Character, ExtractedContext, PlotPoint, Setting, StoryContext, Term, PLOT_POINT_WINDOW,
};
