/*!
 * Pipeline tests against an on-disk SQLite database
 */

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use tokio_test::assert_ok;

use chapterwai::chapter::{Chapter, ChapterStatus, ChapterUpdate, LogLevel};
use chapterwai::context::{ExtractedContext, Term};
use chapterwai::database::{DatabaseConnection, Repository};
use chapterwai::errors::StoreError;
use chapterwai::pipeline::{JobOrchestrator, RunResult};
use chapterwai::providers::mock::MockProvider;
use chapterwai::providers::{CompletionRequest, ResponseFormat};
use chapterwai::store::{ChapterStore, ContextStore};

use crate::common::{build_orchestrator, init_logging, PipelineOptions};

fn one_term(request: &CompletionRequest) -> Result<String, chapterwai::errors::ProviderError> {
    match request.response_format {
        ResponseFormat::JsonObject => {
            Ok(r#"{"terms":[{"term":"Trúc Cơ","meaning":"foundation establishment realm"}]}"#.to_string())
        }
        ResponseFormat::Text => Ok(MockProvider::translate_text(request)),
    }
}

fn open(dir: &TempDir) -> Arc<Repository> {
    init_logging();
    let db = DatabaseConnection::new(dir.path().join("data").join("chapters.db")).unwrap();
    Arc::new(Repository::new(db))
}

fn orchestrator(repository: &Arc<Repository>, mock: &MockProvider) -> JobOrchestrator {
    build_orchestrator(repository.clone(), repository.clone(), mock, PipelineOptions::default())
}

/// Test a full chapter run persisted to SQLite
#[tokio::test]
async fn test_runBatch_onSqlite_shouldPersistTranslationLogsAndContext() {
    let dir = TempDir::new().unwrap();
    let repository = open(&dir);
    let mock = MockProvider::working().with_responder(one_term);
    let jobs = orchestrator(&repository, &mock);
    let chapter = Chapter::with_id("c1", "s1", 1, "第一章", "他突破到了筑基期。");
    assert_ok!(repository.insert_chapter(&chapter).await);

    let report = jobs.run_batch(&["c1".to_string()], None).await;

    assert_eq!(report.completed(), 1);
    let stored = repository.get_by_id("c1").await.unwrap().unwrap();
    assert_eq!(stored.status, ChapterStatus::Completed);
    assert_eq!(stored.translated_content.as_deref(), Some("[TRANSLATED] 他突破到了筑基期。"));
    assert!(stored.updated_at >= stored.created_at);

    let logs = assert_ok!(repository.get_logs("c1").await);
    let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(messages.first(), Some(&"Translation started"));
    assert!(messages.contains(&"Translation completed"));
    assert!(messages.contains(&"Story context updated to version 1"));
    assert_eq!(logs.iter().filter(|l| l.level == LogLevel::Success).count(), 1);

    let context = repository.get("s1").await.unwrap().unwrap();
    assert_eq!(context.version, 1);
    assert_eq!(context.context.terms[0].term, "Trúc Cơ");
}

/// Test that data survives reopening the database file
#[tokio::test]
async fn test_reopen_afterRun_shouldKeepChaptersAndContext() {
    let dir = TempDir::new().unwrap();
    {
        let repository = open(&dir);
        let mock = MockProvider::working().with_responder(one_term);
        let jobs = orchestrator(&repository, &mock);
        assert_ok!(
            repository
                .insert_chapter(&Chapter::with_id("c1", "s1", 1, "t", "正文"))
                .await
        );
        jobs.run_batch(&["c1".to_string()], None).await;
    }

    let reopened = open(&dir);
    let chapter = reopened.get_by_id("c1").await.unwrap().unwrap();
    assert_eq!(chapter.status, ChapterStatus::Completed);
    assert!(!chapter.logs.is_empty());
    assert!(reopened.get("s1").await.unwrap().is_some());
}

/// Test that the SQLite store enforces the status state machine
#[tokio::test]
async fn test_update_onSqlite_withIllegalTransition_shouldLeaveChapterUnchanged() {
    let dir = TempDir::new().unwrap();
    let repository = open(&dir);
    assert_ok!(
        repository
            .insert_chapter(&Chapter::with_id("c1", "s1", 1, "t", "正文"))
            .await
    );

    let result = repository
        .update("c1", ChapterUpdate::status(ChapterStatus::Completed))
        .await;

    assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));
    let chapter = repository.get_by_id("c1").await.unwrap().unwrap();
    assert_eq!(chapter.status, ChapterStatus::Pending);
}

/// Test that only one writer can claim a pending chapter
#[tokio::test]
async fn test_update_onSqlite_claimingTranslatingChapter_shouldBeRejected() {
    let dir = TempDir::new().unwrap();
    let first = open(&dir);
    let second = open(&dir);
    assert_ok!(
        first
            .insert_chapter(&Chapter::with_id("c1", "s1", 1, "t", "正文"))
            .await
    );

    assert_ok!(
        first
            .update("c1", ChapterUpdate::status(ChapterStatus::Translating))
            .await
    );
    let claim = second
        .update("c1", ChapterUpdate::status(ChapterStatus::Translating))
        .await;

    assert!(matches!(
        claim,
        Err(StoreError::IllegalTransition {
            from: ChapterStatus::Translating,
            to: ChapterStatus::Translating,
            ..
        })
    ));
}

/// Test optimistic concurrency on story context writes
#[tokio::test]
async fn test_upsert_onSqlite_withStaleVersion_shouldConflict() {
    let dir = TempDir::new().unwrap();
    let repository = open(&dir);
    let context = ExtractedContext {
        terms: vec![Term {
            term: "Linh khí".to_string(),
            meaning: "spiritual energy".to_string(),
        }],
        ..ExtractedContext::default()
    };

    assert_eq!(assert_ok!(repository.upsert("s1", context.clone(), None).await), 1);
    assert_eq!(assert_ok!(repository.upsert("s1", context.clone(), Some(1)).await), 2);

    let stale = repository.upsert("s1", ExtractedContext::empty(), Some(1)).await;
    assert!(matches!(
        stale,
        Err(StoreError::VersionConflict {
            expected: Some(1),
            actual: Some(2),
            ..
        })
    ));
    let recreate = repository.upsert("s1", ExtractedContext::empty(), None).await;
    assert!(matches!(recreate, Err(StoreError::VersionConflict { .. })));

    let stored = repository.get("s1").await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.context, context);
}

/// Test range and pending queries ordering
#[tokio::test]
async fn test_queries_onSqlite_shouldFilterAndOrder() {
    let dir = TempDir::new().unwrap();
    let repository = open(&dir);
    for number in [3u32, 1, 2] {
        let chapter = Chapter::with_id(format!("s1-{}", number), "s1", number, "t", "正文");
        assert_ok!(repository.insert_chapter(&chapter).await);
    }
    assert_ok!(
        repository
            .insert_chapter(&Chapter::with_id("s2-1", "s2", 1, "t", "正文"))
            .await
    );

    let range = assert_ok!(repository.list_by_range("s1", 1, 2).await);
    let numbers: Vec<u32> = range.iter().map(|c| c.chapter_number).collect();
    assert_eq!(numbers, vec![1, 2]);

    let pending = assert_ok!(repository.list_pending(2).await);
    let pending_ids: Vec<&str> = pending.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(pending_ids, vec!["s1-3", "s1-1"]);
}

/// Test that the stuck sweep works against SQLite timestamps
#[tokio::test]
async fn test_sweepStuck_onSqlite_shouldRequeueOldTranslatingChapters() {
    let dir = TempDir::new().unwrap();
    let repository = open(&dir);
    let mock = MockProvider::working();
    let jobs = orchestrator(&repository, &mock);
    for id in ["old", "fresh"] {
        assert_ok!(
            repository
                .insert_chapter(&Chapter::with_id(id, "s1", 1 + (id == "fresh") as u32, "t", "正文"))
                .await
        );
        assert_ok!(
            repository
                .update(id, ChapterUpdate::status(ChapterStatus::Translating))
                .await
        );
    }
    assert_ok!(
        repository
            .set_updated_at("old", Utc::now() - chrono::Duration::hours(2))
            .await
    );

    let swept = assert_ok!(jobs.sweep_stuck(Duration::from_secs(1800)).await);

    assert_eq!(swept, vec!["old".to_string()]);
    let old = repository.get_by_id("old").await.unwrap().unwrap();
    assert_eq!(old.status, ChapterStatus::Pending);
    assert!(old.logs.iter().any(|l| l.level == LogLevel::Error));
    let fresh = repository.get_by_id("fresh").await.unwrap().unwrap();
    assert_eq!(fresh.status, ChapterStatus::Translating);

    // A requeued chapter goes through the pipeline again
    let report = jobs.run_batch(&["old".to_string()], None).await;
    assert_eq!(report.outcomes[0].result, RunResult::Completed);
}
