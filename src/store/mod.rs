/*!
 * Storage interfaces used by the pipeline.
 *
 * `ChapterStore` owns chapters and their audit trail, `ContextStore` owns the
 * per-story narrative context. Both are implemented by the SQLite
 * [`Repository`](crate::database::Repository) and by [`InMemoryStore`].
 *
 * Stores enforce the chapter status state machine: an illegal status write
 * fails with `StoreError::IllegalTransition` and leaves the chapter untouched.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::chapter::{Chapter, ChapterStatus, ChapterUpdate, LogLevel};
use crate::context::{ExtractedContext, StoryContext};
use crate::errors::StoreError;

pub mod memory;

pub use memory::InMemoryStore;

/// Chapter persistence
#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// Load a chapter with its logs
    async fn get_by_id(&self, chapter_id: &str) -> Result<Option<Chapter>, StoreError>;

    /// Apply a partial update; status changes are validated
    async fn update(&self, chapter_id: &str, update: ChapterUpdate) -> Result<Chapter, StoreError>;

    /// Append an entry to the chapter's audit trail.
    ///
    /// An entry counts as progress and refreshes the chapter's `updated_at`.
    async fn append_log(
        &self,
        chapter_id: &str,
        level: LogLevel,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<(), StoreError>;

    /// Chapters in `status`, oldest first
    async fn list_in_status(&self, status: ChapterStatus, limit: usize) -> Result<Vec<Chapter>, StoreError>;

    /// Chapters of a story with `from <= chapter_number <= to`, by number
    async fn list_by_range(&self, story_id: &str, from: u32, to: u32) -> Result<Vec<Chapter>, StoreError>;

    /// Pending chapters, oldest first
    async fn list_pending(&self, limit: usize) -> Result<Vec<Chapter>, StoreError> {
        self.list_in_status(ChapterStatus::Pending, limit).await
    }

    /// Chapters in `translating` whose last update is older than `cutoff`
    async fn list_stuck(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Chapter>, StoreError> {
        let translating = self.list_in_status(ChapterStatus::Translating, usize::MAX).await?;
        Ok(translating
            .into_iter()
            .filter(|c| c.updated_at < cutoff)
            .take(limit)
            .collect())
    }
}

/// Story context persistence with optimistic concurrency
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(&self, story_id: &str) -> Result<Option<StoryContext>, StoreError>;

    /// Write a story context and return its new version.
    ///
    /// `expected_version` is the version the caller read: `None` means the
    /// caller saw no context and the write must create it, `Some(v)` means the
    /// stored version must still be `v`. A mismatch fails with
    /// `StoreError::VersionConflict`.
    async fn upsert(
        &self,
        story_id: &str,
        context: ExtractedContext,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;
}

/// Validate a status change against the state machine for `chapter`
pub(crate) fn check_transition(chapter: &Chapter, next: ChapterStatus) -> Result<bool, StoreError> {
    chapter
        .status
        .transition(next)
        .map_err(|e| StoreError::IllegalTransition {
            chapter_id: chapter.id.clone(),
            from: e.from,
            to: e.to,
        })
}

/// Validate an optimistic write against the stored version
pub(crate) fn check_version(
    story_id: &str,
    expected: Option<u64>,
    actual: Option<u64>,
) -> Result<u64, StoreError> {
    if expected != actual {
        return Err(StoreError::VersionConflict {
            story_id: story_id.to_string(),
            expected,
            actual,
        });
    }
    Ok(actual.map_or(1, |v| v + 1))
}
