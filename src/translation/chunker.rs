/*!
 * Paragraph-aware text chunking.
 *
 * Text is split on blank lines; paragraphs are packed greedily into chunks of
 * at most `max_chunk_size` characters, counting the `"\n\n"` separator. A
 * single paragraph longer than the limit is emitted whole as its own chunk.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Default chunk size in characters
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 8000;

/// Separator placed between paragraphs of a chunk and between chunks
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n\s*\n").expect("paragraph regex is valid"));

/// Trimmed, non-empty paragraphs of `text`
pub fn paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split `text` into ordered chunks.
///
/// Never produces empty chunks; joining the result with `"\n\n"` yields the
/// trimmed paragraphs of `text` joined the same way.
pub fn split(text: &str, max_chunk_size: usize) -> Vec<String> {
    let separator_len = PARAGRAPH_SEPARATOR.chars().count();
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in paragraphs(text) {
        let paragraph_len = paragraph.chars().count();

        if !current.is_empty() && current_len + separator_len + paragraph_len > max_chunk_size {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push_str(PARAGRAPH_SEPARATOR);
            current_len += separator_len;
        }
        current.push_str(paragraph);
        current_len += paragraph_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split with [`DEFAULT_MAX_CHUNK_SIZE`]
pub fn split_default(text: &str) -> Vec<String> {
    split(text, DEFAULT_MAX_CHUNK_SIZE)
}
