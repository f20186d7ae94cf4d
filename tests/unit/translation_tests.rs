/*!
 * Tests for chunking, prompt building and the translator
 */

use std::sync::Arc;
use std::time::Duration;

use chapterwai::context::{Character, ExtractedContext, PlotPoint, Term};
use chapterwai::errors::ProviderError;
use chapterwai::providers::mock::MockProvider;
use chapterwai::translation::chunker::{self, paragraphs, split};
use chapterwai::translation::prompts::render_context_block;
use chapterwai::translation::{Translator, TranslatorSettings, PROMPT_PLOT_POINTS};

fn translator(mock: &MockProvider, max_chunk_size: usize, chunk_delay: Duration) -> Translator {
    Translator::new(
        Arc::new(mock.clone()),
        TranslatorSettings {
            max_chunk_size,
            chunk_delay,
            ..TranslatorSettings::default()
        },
    )
}

fn story_context() -> ExtractedContext {
    ExtractedContext {
        characters: vec![Character {
            name: "Lâm Phong".to_string(),
            description: "a wandering swordsman".to_string(),
            personality: Some("calm".to_string()),
        }],
        terms: vec![Term {
            term: "Linh khí".to_string(),
            meaning: "spiritual energy".to_string(),
        }],
        settings: Vec::new(),
        plot_points: (1..=8)
            .map(|i| PlotPoint {
                point: format!("event {}", i),
                description: format!("details {}", i),
            })
            .collect(),
    }
}

/// Test that short text stays a single chunk
#[test]
fn test_split_withShortText_shouldReturnSingleChunk() {
    let chunks = split("第一段\n\n第二段", 8000);
    assert_eq!(chunks, vec!["第一段\n\n第二段".to_string()]);
}

/// Test that blank and whitespace-only text produces no chunks
#[test]
fn test_split_withBlankText_shouldReturnNothing() {
    assert!(split("", 100).is_empty());
    assert!(split(" \n\n \r\n  \n", 100).is_empty());
}

/// Test that two large paragraphs are split apart
#[test]
fn test_split_withTwoLargeParagraphs_shouldReturnTwoChunks() {
    let first = "a".repeat(5000);
    let second = "b".repeat(5000);
    let text = format!("{}\n\n{}", first, second);

    let chunks = split(&text, 8000);

    assert_eq!(chunks, vec![first, second]);
}

/// Test that an oversized paragraph is kept whole
#[test]
fn test_split_withOversizedParagraph_shouldEmitItAlone() {
    let big = "x".repeat(120);
    let text = format!("short\n\n{}\n\ntail", big);

    let chunks = split(&text, 50);

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1], big);
}

/// Test that chunk sizes are counted in characters, not bytes
#[test]
fn test_split_withMultibyteText_shouldCountCharacters() {
    // 4 + 2 + 4 = 10 characters, well over 10 bytes
    let chunks = split("一二三四\n\n五六七八", 10);
    assert_eq!(chunks.len(), 1);

    let chunks = split("一二三四\n\n五六七八", 9);
    assert_eq!(chunks.len(), 2);
}

/// Test that joining chunks restores the paragraphs
#[test]
fn test_split_joinedChunks_shouldMatchParagraphs() {
    let text = "  one  \n\ntwo\r\n\r\nthree\n   \nfour\n\n\n\nfive";
    let chunks = split(text, 12);

    assert!(chunks.iter().all(|c| !c.is_empty()));
    assert_eq!(chunks.join("\n\n"), paragraphs(text).join("\n\n"));
    assert_eq!(paragraphs(text), vec!["one", "two", "three", "four", "five"]);
}

/// Test the default chunk size
#[test]
fn test_splitDefault_shouldUseDefaultSize() {
    let text = "p".repeat(chunker::DEFAULT_MAX_CHUNK_SIZE);
    assert_eq!(chunker::split_default(&text).len(), 1);
}

/// Test context block rendering
#[test]
fn test_renderContextBlock_withContext_shouldListSectionsAndRecentPlotPoints() {
    let block = render_context_block(&story_context()).unwrap();

    assert!(block.contains("CHARACTERS:"));
    assert!(block.contains("- Lâm Phong: a wandering swordsman (Personality: calm)"));
    assert!(block.contains("- Linh khí: spiritual energy"));
    assert!(!block.contains("SETTINGS:"));
    assert!(block.contains("KEY PLOT POINTS:"));
    assert_eq!(block.matches("- event ").count(), PROMPT_PLOT_POINTS);
    assert!(!block.contains("event 3:"));
    assert!(block.contains("event 8: details 8"));
}

/// Test that an empty context renders nothing
#[test]
fn test_renderContextBlock_withEmptyContext_shouldReturnNone() {
    assert!(render_context_block(&ExtractedContext::empty()).is_none());
}

/// Test that the system prompt carries the story context
#[tokio::test]
async fn test_translate_withContext_shouldSendContextInSystemPrompt() {
    let mock = MockProvider::working();
    let translator = translator(&mock, 8000, Duration::ZERO);

    let result = translator
        .translate("他拔出了剑。", Some(&story_context()), "deepseek-chat")
        .await
        .unwrap();

    assert_eq!(result.text, "[TRANSLATED] 他拔出了剑。");
    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].system_prompt.contains("Chinese"));
    assert!(requests[0].system_prompt.contains("Vietnamese"));
    assert!(requests[0].system_prompt.contains("Lâm Phong"));
    assert!(requests[0].user_prompt.ends_with("他拔出了剑。"));
    assert_eq!(requests[0].model, "deepseek-chat");
}

/// Test chunked translation of two large paragraphs with the chunk delay
#[tokio::test(start_paused = true)]
async fn test_translateLongText_withTwoLargeParagraphs_shouldTranslateSequentially() {
    let mock = MockProvider::working();
    let translator = translator(&mock, 8000, Duration::from_millis(1000));
    let text = format!("{}\n\n{}", "a".repeat(5000), "b".repeat(5000));
    let start = tokio::time::Instant::now();

    let result = translator.translate_long_text(&text, None, "m").await.unwrap();

    assert_eq!(result.chunk_count, 2);
    assert_eq!(mock.request_count(), 2);
    let requests = mock.requests();
    assert!(requests[0].user_prompt.ends_with(&"a".repeat(5000)));
    assert!(requests[1].user_prompt.ends_with(&"b".repeat(5000)));
    assert_eq!(
        result.text,
        format!("[TRANSLATED] {}\n\n[TRANSLATED] {}", "a".repeat(5000), "b".repeat(5000))
    );
    assert_eq!(result.usage.requests, 2);
    assert_eq!(tokio::time::Instant::now() - start, Duration::from_millis(1000));
}

/// Test that every chunk of a text sees the same context
#[tokio::test]
async fn test_translateLongText_withContext_shouldReuseSnapshotForEveryChunk() {
    let mock = MockProvider::working();
    let translator = translator(&mock, 5, Duration::ZERO);

    translator
        .translate_long_text("aaaa\n\nbbbb\n\ncccc", Some(&story_context()), "m")
        .await
        .unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.system_prompt == requests[0].system_prompt));
}

/// Test that the first failing chunk stops the text
#[tokio::test]
async fn test_translateLongText_withFailingSecondChunk_shouldStop() {
    let mock = MockProvider::working().with_script(vec![
        Ok("first".to_string()),
        Err(ProviderError::RateLimitExceeded("slow down".to_string())),
    ]);
    let translator = translator(&mock, 5, Duration::ZERO);

    let result = translator.translate_long_text("aaaa\n\nbbbb\n\ncccc", None, "m").await;

    assert!(matches!(result, Err(ProviderError::RateLimitExceeded(_))));
    assert_eq!(mock.request_count(), 2);
}
