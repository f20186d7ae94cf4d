/*!
 * Tests for story context merging and extraction
 */

use std::sync::Arc;

use chrono::Utc;
use chapterwai::app_config::ExtractionConfig;
use chapterwai::context::{
    merge, merge_contexts, parse_extraction, Character, ContextExtractor, ExtractedContext,
    PlotPoint, Setting, StoryContext, Term, PLOT_POINT_WINDOW,
};
use chapterwai::errors::{PipelineError, ProviderError};
use chapterwai::providers::mock::MockProvider;
use chapterwai::providers::ResponseFormat;

fn character(name: &str, description: &str) -> Character {
    Character {
        name: name.to_string(),
        description: description.to_string(),
        personality: None,
    }
}

fn plot_points(chapter: usize, count: usize) -> Vec<PlotPoint> {
    (1..=count)
        .map(|i| PlotPoint {
            point: format!("ch{}-p{}", chapter, i),
            description: format!("event {} of chapter {}", i, chapter),
        })
        .collect()
}

fn stored(context: ExtractedContext) -> StoryContext {
    StoryContext {
        story_id: "story".to_string(),
        context,
        version: 1,
        updated_at: Utc::now(),
    }
}

/// Test that a longer description replaces the stored character
#[test]
fn test_merge_withLongerDescription_shouldReplaceCharacter() {
    let existing = stored(ExtractedContext {
        characters: vec![character("Lâm Phong", "a")],
        ..ExtractedContext::default()
    });
    let incoming = ExtractedContext {
        characters: vec![character("lâm phong ", "a young swordsman from the north")],
        ..ExtractedContext::default()
    };

    let merged = merge(Some(&existing), incoming);

    assert_eq!(merged.characters.len(), 1);
    assert_eq!(merged.characters[0].description, "a young swordsman from the north");
}

/// Test that an equal or shorter description keeps the stored one
#[test]
fn test_merge_withShorterOrEqualDescription_shouldKeepExisting() {
    let existing = ExtractedContext {
        terms: vec![Term {
            term: "Linh khí".to_string(),
            meaning: "spiritual energy".to_string(),
        }],
        ..ExtractedContext::default()
    };
    let incoming = ExtractedContext {
        terms: vec![
            Term {
                term: "LINH KHÍ".to_string(),
                meaning: "energy".to_string(),
            },
            Term {
                term: "linh khí".to_string(),
                meaning: "spirit energy!!!".to_string(),
            },
        ],
        ..ExtractedContext::default()
    };

    let merged = merge_contexts(&existing, incoming);

    // "spirit energy!!!" has as many characters as "spiritual energy"
    assert_eq!(merged.terms.len(), 1);
    assert_eq!(merged.terms[0].meaning, "spiritual energy");
    assert_eq!(merged.terms[0].term, "Linh khí");
}

/// Test that new keys are appended after existing ones
#[test]
fn test_merge_withNewEntries_shouldAppendInOrder() {
    let existing = ExtractedContext {
        settings: vec![Setting {
            location: "Thanh Vân Sect".to_string(),
            description: "mountain sect".to_string(),
        }],
        ..ExtractedContext::default()
    };
    let incoming = ExtractedContext {
        settings: vec![
            Setting {
                location: "Black Forest".to_string(),
                description: "dangerous".to_string(),
            },
            Setting {
                location: "thanh vân sect".to_string(),
                description: "short".to_string(),
            },
        ],
        ..ExtractedContext::default()
    };

    let merged = merge_contexts(&existing, incoming);

    let locations: Vec<&str> = merged.settings.iter().map(|s| s.location.as_str()).collect();
    assert_eq!(locations, vec!["Thanh Vân Sect", "Black Forest"]);
}

/// Test the plot point window over five chapters
#[test]
fn test_merge_withFiveChaptersOfPlotPoints_shouldKeepMostRecentTwenty() {
    let mut story: Option<StoryContext> = None;

    for chapter in 1..=5 {
        let incoming = ExtractedContext {
            plot_points: plot_points(chapter, 5),
            ..ExtractedContext::default()
        };
        let merged = merge(story.as_ref(), incoming);
        story = Some(stored(merged));
    }

    let points = story.unwrap().context.plot_points;
    assert_eq!(points.len(), PLOT_POINT_WINDOW);
    assert_eq!(points[0].point, "ch2-p1");
    assert_eq!(points[19].point, "ch5-p5");
    assert!(points.iter().all(|p| !p.point.starts_with("ch1-")));
}

/// Test that merging with nothing stored yields the incoming context
#[test]
fn test_merge_withNoStoredContext_shouldReturnIncoming() {
    let incoming = ExtractedContext {
        characters: vec![character("Tô Vân", "healer")],
        plot_points: plot_points(1, 2),
        ..ExtractedContext::default()
    };

    assert_eq!(merge(None, incoming.clone()), incoming);
}

/// Test that the first context of a story is stored as extracted
#[test]
fn test_merge_withNoStoredContext_shouldNotNormalizeIncoming() {
    let incoming = ExtractedContext {
        characters: vec![character("Tô Vân", "healer"), character("tô vân", "a healer of the valley")],
        plot_points: plot_points(1, PLOT_POINT_WINDOW + 2),
        ..ExtractedContext::default()
    };

    let merged = merge(None, incoming.clone());

    assert_eq!(merged, incoming);
    assert_eq!(merged.characters.len(), 2);
    assert_eq!(merged.plot_points.len(), PLOT_POINT_WINDOW + 2);
}

/// Test that merging an empty context changes nothing
#[test]
fn test_merge_withEmptyIncoming_shouldBeIdentity() {
    let existing = ExtractedContext {
        characters: vec![character("Tô Vân", "healer")],
        plot_points: plot_points(1, 3),
        ..ExtractedContext::default()
    };

    assert_eq!(merge_contexts(&existing, ExtractedContext::empty()), existing);
}

/// Test tolerant parsing of the model's JSON
#[test]
fn test_parseExtraction_withFencedPartialJson_shouldParse() {
    let response = "```json\n{\"characters\":[{\"name\":\"Lâm Phong\",\"description\":\"swordsman\"}],\"plotPoints\":[{\"point\":\"duel\",\"description\":\"won\"}]}\n```";

    let context = parse_extraction(response).unwrap();

    assert_eq!(context.characters.len(), 1);
    assert_eq!(context.plot_points.len(), 1);
    assert!(context.terms.is_empty());
    assert!(context.settings.is_empty());
}

/// Test that prose instead of JSON is an extraction error
#[test]
fn test_parseExtraction_withProse_shouldFail() {
    let result = parse_extraction("Here are the characters: Lâm Phong.");
    assert!(matches!(result, Err(PipelineError::Extraction(_))));
}

/// Test that the extractor requests JSON over a bounded prefix
#[tokio::test]
async fn test_tryExtract_shouldSendJsonRequestWithPrefix() {
    let mock = MockProvider::working();
    let extractor = ContextExtractor::new(
        Arc::new(mock.clone()),
        ExtractionConfig {
            prefix_chars: 10,
            ..ExtractionConfig::default()
        },
    );
    let text = "一".repeat(50);

    let extraction = extractor.try_extract(&text, "deepseek-chat").await.unwrap();

    assert!(extraction.context.is_empty());
    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].response_format, ResponseFormat::JsonObject);
    assert!(requests[0].user_prompt.ends_with(&"一".repeat(10)));
    assert!(!requests[0].user_prompt.contains(&"一".repeat(11)));
}

/// Test that extraction failures yield an empty context
#[tokio::test]
async fn test_extract_withFailingProvider_shouldReturnEmptyContext() {
    let mock = MockProvider::working().with_script(vec![
        Err(ProviderError::ConnectionError("reset".to_string())),
        Ok("not json at all".to_string()),
    ]);
    let extractor = ContextExtractor::new(Arc::new(mock.clone()), ExtractionConfig::default());

    assert!(extractor.extract("chapter text", "m").await.is_empty());
    assert!(extractor.extract("chapter text", "m").await.is_empty());
    assert_eq!(mock.request_count(), 2);
}

/// Test that blank text is not sent to the provider
#[tokio::test]
async fn test_tryExtract_withBlankText_shouldNotCallProvider() {
    let mock = MockProvider::failing();
    let extractor = ContextExtractor::new(Arc::new(mock.clone()), ExtractionConfig::default());

    let extraction = extractor.try_extract("   ", "m").await.unwrap();

    assert!(extraction.context.is_empty());
    assert_eq!(mock.request_count(), 0);
}
