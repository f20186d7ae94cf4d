/*!
 * In-memory implementation of both stores.
 *
 * Used by tests and dry runs. Besides the store contracts it records every
 * status transition and can inject write failures and concurrent context
 * writes.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{check_transition, check_version, ChapterStore, ContextStore};
use crate::chapter::{Chapter, ChapterLogEntry, ChapterStatus, ChapterUpdate, LogLevel};
use crate::context::{merge_contexts, ExtractedContext, StoryContext};
use crate::errors::StoreError;

#[derive(Debug, Default)]
struct MemoryState {
    chapters: HashMap<String, Chapter>,
    /// Insertion order, used as "oldest first"
    order: Vec<String>,
    contexts: HashMap<String, StoryContext>,
    history: HashMap<String, Vec<ChapterStatus>>,
    failing_updates: HashMap<ChapterStatus, usize>,
    failing_context_writes: usize,
    interleaved_writes: Vec<(String, ExtractedContext)>,
}

/// Thread-safe in-memory chapter and context store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a chapter
    pub fn insert_chapter(&self, chapter: Chapter) {
        let mut state = self.state.lock();
        if !state.chapters.contains_key(&chapter.id) {
            state.order.push(chapter.id.clone());
        }
        state.history.insert(chapter.id.clone(), vec![chapter.status]);
        state.chapters.insert(chapter.id.clone(), chapter);
    }

    /// Seed a story context at version 1
    pub fn insert_context(&self, story_id: &str, context: ExtractedContext) {
        self.state.lock().contexts.insert(
            story_id.to_string(),
            StoryContext {
                story_id: story_id.to_string(),
                context,
                version: 1,
                updated_at: Utc::now(),
            },
        );
    }

    /// Snapshot of a chapter
    pub fn chapter(&self, chapter_id: &str) -> Option<Chapter> {
        self.state.lock().chapters.get(chapter_id).cloned()
    }

    /// Snapshot of a story context
    pub fn context(&self, story_id: &str) -> Option<StoryContext> {
        self.state.lock().contexts.get(story_id).cloned()
    }

    /// Every status the chapter has had, starting with its initial one
    pub fn status_history(&self, chapter_id: &str) -> Vec<ChapterStatus> {
        self.state
            .lock()
            .history
            .get(chapter_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Backdate a chapter's last update
    pub fn set_updated_at(&self, chapter_id: &str, updated_at: DateTime<Utc>) {
        if let Some(chapter) = self.state.lock().chapters.get_mut(chapter_id) {
            chapter.updated_at = updated_at;
        }
    }

    /// Make the next `times` status writes to `status` fail with a database error
    pub fn fail_updates_to(&self, status: ChapterStatus, times: usize) {
        self.state.lock().failing_updates.insert(status, times);
    }

    /// Make the next `times` context writes fail with a database error
    pub fn fail_context_writes(&self, times: usize) {
        self.state.lock().failing_context_writes = times;
    }

    /// Queue a context write that lands right before the next `upsert`
    /// of `story_id`, as if another writer got there first
    pub fn interleave_context_write(&self, story_id: &str, context: ExtractedContext) {
        self.state
            .lock()
            .interleaved_writes
            .push((story_id.to_string(), context));
    }
}

fn sorted_by_age(state: &MemoryState, mut keep: impl FnMut(&Chapter) -> bool) -> Vec<Chapter> {
    state
        .order
        .iter()
        .filter_map(|id| state.chapters.get(id))
        .filter(|c| keep(c))
        .cloned()
        .collect()
}

#[async_trait]
impl ChapterStore for InMemoryStore {
    async fn get_by_id(&self, chapter_id: &str) -> Result<Option<Chapter>, StoreError> {
        Ok(self.chapter(chapter_id))
    }

    async fn update(&self, chapter_id: &str, update: ChapterUpdate) -> Result<Chapter, StoreError> {
        let mut state = self.state.lock();

        if let Some(status) = update.status {
            if let Some(remaining) = state.failing_updates.get_mut(&status) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StoreError::Database(format!(
                        "injected failure writing status {}",
                        status
                    )));
                }
            }
        }

        let chapter = state
            .chapters
            .get_mut(chapter_id)
            .ok_or_else(|| StoreError::NotFound(format!("chapter {}", chapter_id)))?;

        let mut changed = false;
        if let Some(status) = update.status {
            if check_transition(chapter, status)? {
                chapter.status = status;
                changed = true;
            }
        }
        if let Some(content) = update.translated_content {
            chapter.translated_content = Some(content);
            changed = true;
        }
        if changed {
            chapter.updated_at = Utc::now();
        }

        let snapshot = chapter.clone();
        if let Some(status) = update.status {
            let history = state.history.entry(chapter_id.to_string()).or_default();
            if history.last() != Some(&status) {
                history.push(status);
            }
        }
        Ok(snapshot)
    }

    async fn append_log(
        &self,
        chapter_id: &str,
        level: LogLevel,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let chapter = state
            .chapters
            .get_mut(chapter_id)
            .ok_or_else(|| StoreError::NotFound(format!("chapter {}", chapter_id)))?;
        let entry = ChapterLogEntry::new(level, message, data);
        chapter.updated_at = entry.timestamp;
        chapter.logs.push(entry);
        Ok(())
    }

    async fn list_in_status(&self, status: ChapterStatus, limit: usize) -> Result<Vec<Chapter>, StoreError> {
        let state = self.state.lock();
        let mut chapters = sorted_by_age(&state, |c| c.status == status);
        chapters.truncate(limit);
        Ok(chapters)
    }

    async fn list_by_range(&self, story_id: &str, from: u32, to: u32) -> Result<Vec<Chapter>, StoreError> {
        let state = self.state.lock();
        let mut chapters = sorted_by_age(&state, |c| {
            c.story_id == story_id && c.chapter_number >= from && c.chapter_number <= to
        });
        chapters.sort_by_key(|c| c.chapter_number);
        Ok(chapters)
    }
}

#[async_trait]
impl ContextStore for InMemoryStore {
    async fn get(&self, story_id: &str) -> Result<Option<StoryContext>, StoreError> {
        Ok(self.context(story_id))
    }

    async fn upsert(
        &self,
        story_id: &str,
        context: ExtractedContext,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock();

        if state.failing_context_writes > 0 {
            state.failing_context_writes -= 1;
            return Err(StoreError::Database("injected context write failure".to_string()));
        }

        if let Some(index) = state.interleaved_writes.iter().position(|(id, _)| id == story_id) {
            let (_, foreign) = state.interleaved_writes.remove(index);
            let (merged, version) = match state.contexts.get(story_id) {
                Some(stored) => (merge_contexts(&stored.context, foreign), stored.version + 1),
                None => (merge_contexts(&ExtractedContext::empty(), foreign), 1),
            };
            state.contexts.insert(
                story_id.to_string(),
                StoryContext {
                    story_id: story_id.to_string(),
                    context: merged,
                    version,
                    updated_at: Utc::now(),
                },
            );
        }

        let actual = state.contexts.get(story_id).map(|c| c.version);
        let version = check_version(story_id, expected_version, actual)?;
        state.contexts.insert(
            story_id.to_string(),
            StoryContext {
                story_id: story_id.to_string(),
                context,
                version,
                updated_at: Utc::now(),
            },
        );
        Ok(version)
    }
}
