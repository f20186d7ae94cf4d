/*!
 * Background chapter translation jobs.
 *
 * A batch is a list of chapter ids. Every chapter runs through the steps
 * `load-validate`, `translate`, `persist`, `extract-context` and
 * `merge-context`, each retried through the shared [`RetryPolicy`]. A failing
 * chapter is marked `failed` and the batch moves on.
 *
 * Chapters of one story run in submission order, one at a time. Chapters of
 * different stories run concurrently up to `max_concurrent_chapters`, with
 * starts staggered by `chapter_delay` per position in the batch.
 */

use chrono::Utc;
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::lanes::StoryLanes;
use super::retry::RetryPolicy;
use super::steps::{ChapterOutcome, RunResult, StepName, StepOutcome};
use crate::app_config::PipelineConfig;
use crate::chapter::{Chapter, ChapterStatus, ChapterUpdate, LogLevel};
use crate::context::{merge, ContextExtractor, ExtractedContext, StoryContext};
use crate::errors::{PipelineError, StoreError};
use crate::store::{ChapterStore, ContextStore};
use crate::translation::{LongTextTranslation, TokenUsageStats, Translator};

/// Model used when a batch does not name one
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Scheduling and retry settings of the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Stagger between chapter starts, multiplied by the position in the batch
    pub chapter_delay: Duration,
    pub max_concurrent_chapters: usize,
    pub retry: RetryPolicy,
    pub default_model: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default(), DEFAULT_MODEL)
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &PipelineConfig, default_model: impl Into<String>) -> Self {
        Self {
            chapter_delay: Duration::from_millis(config.chapter_delay_ms),
            max_concurrent_chapters: config.max_concurrent_chapters.max(1),
            retry: config.retry.to_policy(),
            default_model: default_model.into(),
        }
    }
}

/// Acknowledgement of a submitted batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchAck {
    pub job_id: String,
    pub count: usize,
    pub chapter_ids: Vec<String>,
}

/// Outcomes of a finished batch, in submission order
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub job_id: String,
    pub outcomes: Vec<ChapterOutcome>,
    pub usage: TokenUsageStats,
    pub elapsed: Duration,
}

impl BatchReport {
    fn count(&self, result: RunResult) -> usize {
        self.outcomes.iter().filter(|o| o.result == result).count()
    }

    pub fn completed(&self) -> usize {
        self.count(RunResult::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(RunResult::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(RunResult::Skipped)
    }

    pub fn outcome(&self, chapter_id: &str) -> Option<&ChapterOutcome> {
        self.outcomes.iter().find(|o| o.chapter_id == chapter_id)
    }

    pub fn summary(&self) -> String {
        format!(
            "Batch {}: {} chapter(s), {} completed, {} failed, {} skipped in {:.1}s",
            self.job_id,
            self.outcomes.len(),
            self.completed(),
            self.failed(),
            self.skipped(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Drives chapters through the translation pipeline
#[derive(Clone)]
pub struct JobOrchestrator {
    chapters: Arc<dyn ChapterStore>,
    contexts: Arc<dyn ContextStore>,
    translator: Translator,
    extractor: ContextExtractor,
    settings: OrchestratorSettings,
    lanes: Arc<StoryLanes>,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("settings", &self.settings)
            .finish()
    }
}

impl JobOrchestrator {
    pub fn new(
        chapters: Arc<dyn ChapterStore>,
        contexts: Arc<dyn ContextStore>,
        translator: Translator,
        extractor: ContextExtractor,
        settings: OrchestratorSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_chapters.max(1)));
        Self {
            chapters,
            contexts,
            translator,
            extractor,
            settings,
            lanes: Arc::new(StoryLanes::new()),
            permits,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Start a batch in the background and acknowledge it right away.
    ///
    /// Outcomes are observed through chapter status and logs.
    pub fn submit(&self, chapter_ids: Vec<String>, model: Option<String>) -> BatchAck {
        let (ack, _handle) = self.spawn_batch(chapter_ids, model);
        ack
    }

    /// Like [`submit`](Self::submit), keeping a handle on the report
    pub fn spawn_batch(&self, chapter_ids: Vec<String>, model: Option<String>) -> (BatchAck, JoinHandle<BatchReport>) {
        let ack = BatchAck {
            job_id: uuid::Uuid::new_v4().to_string(),
            count: chapter_ids.len(),
            chapter_ids,
        };
        info!("Accepted batch {} with {} chapter(s)", ack.job_id, ack.count);

        let orchestrator = self.clone();
        let job_id = ack.job_id.clone();
        let ids = ack.chapter_ids.clone();
        let handle = tokio::spawn(async move {
            let report = orchestrator.run_job(job_id, &ids, model.as_deref()).await;
            info!("{}", report.summary());
            report
        });

        (ack, handle)
    }

    /// Process a batch and wait for every chapter
    pub async fn run_batch(&self, chapter_ids: &[String], model: Option<&str>) -> BatchReport {
        self.run_job(uuid::Uuid::new_v4().to_string(), chapter_ids, model).await
    }

    /// Translate up to `limit` pending chapters, oldest first
    pub async fn translate_pending(&self, limit: usize, model: Option<&str>) -> Result<BatchReport, StoreError> {
        let pending = self.chapters.list_pending(limit).await?;
        let ids: Vec<String> = pending.into_iter().map(|c| c.id).collect();
        info!("Found {} pending chapter(s)", ids.len());
        Ok(self.run_batch(&ids, model).await)
    }

    /// Translate the untranslated chapters of a story numbered `from..=to`
    pub async fn translate_range(
        &self,
        story_id: &str,
        from: u32,
        to: u32,
        model: Option<&str>,
    ) -> Result<BatchReport, StoreError> {
        let chapters = self.chapters.list_by_range(story_id, from, to).await?;
        let ids: Vec<String> = chapters
            .into_iter()
            .filter(|c| matches!(c.status, ChapterStatus::Pending | ChapterStatus::Failed))
            .map(|c| c.id)
            .collect();
        info!(
            "Story {} chapters {}-{}: {} to translate",
            story_id,
            from,
            to,
            ids.len()
        );
        Ok(self.run_batch(&ids, model).await)
    }

    /// Move a failed chapter back to `pending`
    pub async fn resubmit(&self, chapter_id: &str) -> Result<Chapter, StoreError> {
        let chapter = self
            .chapters
            .update(chapter_id, ChapterUpdate::status(ChapterStatus::Pending))
            .await?;
        self.audit(chapter_id, LogLevel::Info, "Chapter requeued for translation", None)
            .await;
        info!("Chapter {} requeued", chapter_id);
        Ok(chapter)
    }

    /// Reclaim chapters left in `translating` for longer than `ttl`.
    ///
    /// Each one is failed and then requeued. Returns the reclaimed ids.
    /// The sweep waits for the story's lane, so runs of this orchestrator are
    /// never reclaimed. Runs owned by another process are only protected by
    /// their audit entries, so `ttl` must exceed the longest translate step.
    pub async fn sweep_stuck(&self, ttl: Duration) -> Result<Vec<String>, StoreError> {
        let ttl_chrono = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(ttl_chrono)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let stuck = self.chapters.list_stuck(cutoff, usize::MAX).await?;
        let mut reclaimed = Vec::new();

        for chapter in stuck {
            let _lane = self.lanes.acquire(&chapter.story_id).await;
            match self.chapters.get_by_id(&chapter.id).await? {
                Some(current) if current.status == ChapterStatus::Translating && current.updated_at < cutoff => {}
                _ => {
                    debug!("Chapter {} progressed while waiting, not reclaimed", chapter.id);
                    continue;
                }
            }

            let failed = self
                .chapters
                .update(&chapter.id, ChapterUpdate::status(ChapterStatus::Failed))
                .await;
            if let Err(e) = failed {
                // Finished or reclaimed by someone else meanwhile
                warn!("Could not reclaim chapter {}: {}", chapter.id, e);
                continue;
            }
            self.audit(
                &chapter.id,
                LogLevel::Error,
                "Translation abandoned, no progress before the time limit",
                Some(json!({
                    "last_update": chapter.updated_at.to_rfc3339(),
                    "ttl_secs": ttl.as_secs(),
                })),
            )
            .await;

            self.chapters
                .update(&chapter.id, ChapterUpdate::status(ChapterStatus::Pending))
                .await?;
            self.audit(&chapter.id, LogLevel::Info, "Chapter requeued for translation", None)
                .await;

            warn!("Reclaimed stuck chapter {}", chapter.id);
            reclaimed.push(chapter.id);
        }

        Ok(reclaimed)
    }

    /// Run one chapter through every step
    pub async fn process_chapter(&self, chapter_id: &str, model: Option<&str>) -> ChapterOutcome {
        let model = model.unwrap_or(self.settings.default_model.as_str());
        let story_id = self.story_of(chapter_id).await;
        self.run_chapter(chapter_id, story_id.as_deref(), model).await
    }

    async fn run_job(&self, job_id: String, chapter_ids: &[String], model: Option<&str>) -> BatchReport {
        let model = model.unwrap_or(self.settings.default_model.as_str());
        let started = Instant::now();
        info!("Starting batch {} ({} chapter(s), model {})", job_id, chapter_ids.len(), model);

        // One sequential group per story, kept in submission order
        let mut groups: Vec<(Option<String>, Vec<(usize, &str)>)> = Vec::new();
        let mut group_of_story: HashMap<String, usize> = HashMap::new();
        for (index, id) in chapter_ids.iter().enumerate() {
            let story_id = self.story_of(id).await;
            match story_id.as_ref().and_then(|s| group_of_story.get(s)) {
                Some(&group) => groups[group].1.push((index, id.as_str())),
                None => {
                    if let Some(story) = &story_id {
                        group_of_story.insert(story.clone(), groups.len());
                    }
                    groups.push((story_id, vec![(index, id.as_str())]));
                }
            }
        }

        let runs = groups.iter().map(|(story_id, members)| async move {
            let mut outcomes = Vec::with_capacity(members.len());
            for &(index, id) in members {
                let start_at = started + self.settings.chapter_delay * index as u32;
                tokio::time::sleep_until(start_at).await;
                outcomes.push((index, self.run_chapter(id, story_id.as_deref(), model).await));
            }
            outcomes
        });

        let mut indexed: Vec<(usize, ChapterOutcome)> = join_all(runs).await.into_iter().flatten().collect();
        indexed.sort_by_key(|(index, _)| *index);

        let mut usage = TokenUsageStats::with_provider_info(String::new(), model.to_string());
        for (_, outcome) in &indexed {
            usage.merge(&outcome.usage);
        }

        BatchReport {
            job_id,
            outcomes: indexed.into_iter().map(|(_, outcome)| outcome).collect(),
            usage,
            elapsed: started.elapsed(),
        }
    }

    async fn story_of(&self, chapter_id: &str) -> Option<String> {
        let chapters = &self.chapters;
        let loaded = self
            .settings
            .retry
            .run("load chapter", move |_| async move {
                chapters.get_by_id(chapter_id).await.map_err(PipelineError::from)
            })
            .await;
        match loaded.result {
            Ok(chapter) => chapter.map(|c| c.story_id),
            Err(e) => {
                warn!("Could not read chapter {}: {}", chapter_id, e);
                None
            }
        }
    }

    async fn run_chapter(&self, chapter_id: &str, story_id: Option<&str>, model: &str) -> ChapterOutcome {
        let mut outcome = ChapterOutcome::new(chapter_id);

        // Unknown ids fail in load-validate without a lane
        let _lane = match story_id {
            Some(story) => Some(self.lanes.acquire(story).await),
            None => None,
        };
        // The semaphore is never closed
        let _permit = self.permits.acquire().await.ok();

        let started = Instant::now();
        self.run_steps(chapter_id, model, &mut outcome).await;
        debug!(
            "Chapter {} finished as {} in {:.2}s",
            chapter_id,
            outcome.result,
            started.elapsed().as_secs_f64()
        );
        outcome
    }

    async fn run_steps(&self, chapter_id: &str, model: &str, outcome: &mut ChapterOutcome) {
        let Some(chapter) = self.load_validate(chapter_id, model, outcome).await else {
            return;
        };

        let Some(translation) = self.translate_step(&chapter, model, outcome).await else {
            return;
        };

        if !self.persist_step(&chapter, &translation, outcome).await {
            return;
        }

        let extracted = self.extract_step(&chapter, &translation.text, model, outcome).await;
        self.merge_step(&chapter, extracted, outcome).await;
    }

    /// Load, guard the status, move to `translating` and check the input
    async fn load_validate(&self, chapter_id: &str, model: &str, outcome: &mut ChapterOutcome) -> Option<Chapter> {
        let step = StepName::LoadValidate;
        let chapters = &self.chapters;

        let loaded = self
            .settings
            .retry
            .run("load chapter", move |_| async move {
                chapters.get_by_id(chapter_id).await.map_err(PipelineError::from)
            })
            .await;
        let mut attempts = loaded.attempts;

        let chapter = match loaded.result {
            Ok(Some(chapter)) => chapter,
            Ok(None) => {
                let e = PipelineError::from(StoreError::NotFound(format!("chapter {}", chapter_id)));
                error!("Chapter {} not found", chapter_id);
                outcome.record(step, attempts, StepOutcome::failed(&e));
                outcome.result = RunResult::Failed;
                outcome.error = Some(e.to_string());
                return None;
            }
            Err(e) => {
                error!("Could not load chapter {}: {}", chapter_id, e);
                outcome.record(step, attempts, StepOutcome::failed(&e));
                outcome.result = RunResult::Failed;
                outcome.error = Some(e.to_string());
                return None;
            }
        };

        match chapter.status {
            ChapterStatus::Translating | ChapterStatus::Completed => {
                self.skip_owned(chapter_id, chapter.status, attempts, outcome).await;
                return None;
            }
            ChapterStatus::Failed => {
                let requeued = self.write_status(chapter_id, ChapterStatus::Pending).await;
                attempts = attempts.max(requeued.attempts);
                match requeued.result {
                    Ok(_) => {}
                    Err(PipelineError::Persistence(StoreError::IllegalTransition { from, .. })) => {
                        self.skip_owned(chapter_id, from, attempts, outcome).await;
                        return None;
                    }
                    Err(e) => {
                        self.fail_step(&chapter, step, attempts, e, outcome).await;
                        return None;
                    }
                }
                info!("Chapter {} resubmitted after failure", chapter_id);
                self.audit(chapter_id, LogLevel::Info, "Chapter resubmitted after failure", None)
                    .await;
            }
            ChapterStatus::Pending => {}
        }

        let started = self.write_status(chapter_id, ChapterStatus::Translating).await;
        attempts = attempts.max(started.attempts);
        let chapter = match started.result {
            Ok(chapter) => chapter,
            // Claimed by another job between the read and the write
            Err(PipelineError::Persistence(StoreError::IllegalTransition { from, .. })) => {
                self.skip_owned(chapter_id, from, attempts, outcome).await;
                return None;
            }
            Err(e) => {
                // Still pending, nothing to roll back
                error!("Could not start chapter {}: {}", chapter_id, e);
                outcome.record(step, attempts, StepOutcome::failed(&e));
                outcome.result = RunResult::Failed;
                outcome.error = Some(e.to_string());
                return None;
            }
        };

        self.audit(
            chapter_id,
            LogLevel::Info,
            "Translation started",
            Some(json!({ "model": model, "chapter_number": chapter.chapter_number })),
        )
        .await;

        if !chapter.has_content() {
            let e = PipelineError::Validation(format!("No content found for chapter {}", chapter_id));
            self.fail_step(&chapter, step, attempts, e, outcome).await;
            return None;
        }

        outcome.record(step, attempts, StepOutcome::Succeeded);
        Some(chapter)
    }

    /// Leave a chapter that is translated or owned by another job untouched
    async fn skip_owned(&self, chapter_id: &str, status: ChapterStatus, attempts: u32, outcome: &mut ChapterOutcome) {
        let reason = match status {
            ChapterStatus::Translating => "Chapter is already being translated, submission ignored".to_string(),
            ChapterStatus::Completed => "Chapter is already translated, submission ignored".to_string(),
            other => format!("Chapter moved to {} by another job, submission ignored", other),
        };
        warn!("{}: {}", chapter_id, reason);
        self.audit(chapter_id, LogLevel::Warn, &reason, None).await;
        outcome.record(StepName::LoadValidate, attempts, StepOutcome::skipped(reason));
        outcome.result = RunResult::Skipped;
        outcome.final_status = Some(status);
    }

    async fn translate_step(
        &self,
        chapter: &Chapter,
        model: &str,
        outcome: &mut ChapterOutcome,
    ) -> Option<LongTextTranslation> {
        let step = StepName::Translate;
        let contexts = &self.contexts;
        let story_id = chapter.story_id.as_str();

        let snapshot = self
            .settings
            .retry
            .run("read story context", move |_| async move {
                contexts.get(story_id).await.map_err(PipelineError::from)
            })
            .await;
        let snapshot: Option<StoryContext> = match snapshot.result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.fail_step(chapter, step, snapshot.attempts, e, outcome).await;
                return None;
            }
        };

        let translator = &self.translator;
        let chapter_id = chapter.id.as_str();
        let content = chapter.original_content.as_str();
        let context = snapshot.as_ref().map(|s| &s.context);
        let translated = self
            .settings
            .retry
            .run("translate chapter", move |attempt| async move {
                debug!("Translating chapter {} (attempt {})", chapter_id, attempt);
                translator
                    .translate_long_text(content, context, model)
                    .await
                    .map_err(PipelineError::from)
            })
            .await;

        match translated.result {
            Ok(translation) => {
                info!(
                    "Chapter {} translated in {} chunk(s), {} tokens",
                    chapter.id, translation.chunk_count, translation.usage.total_tokens
                );
                self.audit(
                    &chapter.id,
                    LogLevel::Info,
                    &format!("Translated {} chunk(s)", translation.chunk_count),
                    Some(json!({
                        "chunks": translation.chunk_count,
                        "attempts": translated.attempts,
                        "prompt_tokens": translation.usage.prompt_tokens,
                        "completion_tokens": translation.usage.completion_tokens,
                        "context_version": snapshot.as_ref().map(|s| s.version),
                    })),
                )
                .await;
                outcome.usage.merge(&translation.usage);
                outcome.record(step, translated.attempts, StepOutcome::Succeeded);
                Some(translation)
            }
            Err(e) => {
                self.fail_step(chapter, step, translated.attempts, e, outcome).await;
                None
            }
        }
    }

    async fn persist_step(
        &self,
        chapter: &Chapter,
        translation: &LongTextTranslation,
        outcome: &mut ChapterOutcome,
    ) -> bool {
        let step = StepName::Persist;
        let chapters = &self.chapters;
        let chapter_id = chapter.id.as_str();
        let text = translation.text.as_str();

        let persisted = self
            .settings
            .retry
            .run("save translation", move |_| async move {
                chapters
                    .update(chapter_id, ChapterUpdate::completed(text.to_string()))
                    .await
                    .map_err(PipelineError::from)
            })
            .await;

        match persisted.result {
            Ok(_) => {
                info!("Chapter {} completed", chapter_id);
                self.audit(
                    chapter_id,
                    LogLevel::Success,
                    "Translation completed",
                    Some(json!({ "characters": text.chars().count() })),
                )
                .await;
                outcome.record(step, persisted.attempts, StepOutcome::Succeeded);
                outcome.result = RunResult::Completed;
                outcome.final_status = Some(ChapterStatus::Completed);
                true
            }
            Err(e) => {
                self.fail_step(chapter, step, persisted.attempts, e, outcome).await;
                false
            }
        }
    }

    /// Best effort: failures are recorded and never fail the chapter
    async fn extract_step(
        &self,
        chapter: &Chapter,
        translated_text: &str,
        model: &str,
        outcome: &mut ChapterOutcome,
    ) -> Option<ExtractedContext> {
        let step = StepName::ExtractContext;
        let extractor = &self.extractor;
        let started = std::time::Instant::now();

        let extracted = self
            .settings
            .retry
            .run("extract context", move |_| async move {
                extractor.try_extract(translated_text, model).await
            })
            .await;

        match extracted.result {
            Ok(extraction) => {
                outcome.usage.record(extraction.usage, started.elapsed());
                if extraction.context.is_empty() {
                    self.audit(&chapter.id, LogLevel::Info, "No new story context extracted", None)
                        .await;
                    outcome.record(step, extracted.attempts, StepOutcome::skipped("nothing extracted"));
                    return None;
                }
                outcome.record(step, extracted.attempts, StepOutcome::Succeeded);
                Some(extraction.context)
            }
            Err(e) => {
                warn!("Context extraction failed for chapter {}: {}", chapter.id, e);
                self.audit(
                    &chapter.id,
                    LogLevel::Warn,
                    "Context extraction failed, story context left unchanged",
                    Some(json!({ "error": e.to_string(), "attempts": extracted.attempts })),
                )
                .await;
                outcome.record(step, extracted.attempts, StepOutcome::failed(&e));
                None
            }
        }
    }

    /// Merge into a fresh read of the story context and write it back,
    /// starting over when another writer got in between
    async fn merge_step(&self, chapter: &Chapter, extracted: Option<ExtractedContext>, outcome: &mut ChapterOutcome) {
        let step = StepName::MergeContext;
        let Some(extracted) = extracted else {
            outcome.record(step, 0, StepOutcome::skipped("no extracted context"));
            return;
        };

        let contexts = &self.contexts;
        let story_id = chapter.story_id.as_str();
        let incoming = &extracted;

        let merged = self
            .settings
            .retry
            .run("merge story context", move |_| async move {
                let current = contexts.get(story_id).await?;
                let expected = current.as_ref().map(|c| c.version);
                let context = merge(current.as_ref(), incoming.clone());
                let counts = json!({
                    "characters": context.characters.len(),
                    "terms": context.terms.len(),
                    "settings": context.settings.len(),
                    "plot_points": context.plot_points.len(),
                });
                let version = contexts.upsert(story_id, context, expected).await?;
                Ok::<_, PipelineError>((version, counts))
            })
            .await;

        match merged.result {
            Ok((version, counts)) => {
                debug!("Story {} context now at version {}", story_id, version);
                self.audit(
                    &chapter.id,
                    LogLevel::Info,
                    &format!("Story context updated to version {}", version),
                    Some(counts),
                )
                .await;
                outcome.record(step, merged.attempts, StepOutcome::Succeeded);
            }
            Err(e) => {
                warn!("Could not update story context {}: {}", story_id, e);
                self.audit(
                    &chapter.id,
                    LogLevel::Warn,
                    "Story context update failed",
                    Some(json!({ "error": e.to_string(), "attempts": merged.attempts })),
                )
                .await;
                outcome.record(step, merged.attempts, StepOutcome::failed(&e));
            }
        }
    }

    /// Mark the chapter failed after a fatal step error
    async fn fail_step(
        &self,
        chapter: &Chapter,
        step: StepName,
        attempts: u32,
        error: PipelineError,
        outcome: &mut ChapterOutcome,
    ) {
        error!("Chapter {} failed at {}: {}", chapter.id, step, error);
        outcome.record(step, attempts, StepOutcome::failed(&error));
        outcome.result = RunResult::Failed;
        outcome.error = Some(error.to_string());

        let marked = self.write_status(&chapter.id, ChapterStatus::Failed).await;
        match marked.result {
            Ok(updated) => outcome.final_status = Some(updated.status),
            Err(e) => {
                // Left in translating until swept
                error!("Could not mark chapter {} as failed: {}", chapter.id, e);
                outcome.final_status = None;
            }
        }

        self.audit(
            &chapter.id,
            LogLevel::Error,
            &format!("Translation failed at step {}", step),
            Some(json!({
                "step": step.as_str(),
                "attempts": attempts,
                "error": error.to_string(),
                "retryable": error.is_retryable(),
            })),
        )
        .await;
    }

    async fn write_status(&self, chapter_id: &str, status: ChapterStatus) -> super::retry::Retried<Chapter> {
        let chapters = &self.chapters;
        self.settings
            .retry
            .run("update chapter status", move |_| async move {
                chapters
                    .update(chapter_id, ChapterUpdate::status(status))
                    .await
                    .map_err(PipelineError::from)
            })
            .await
    }

    /// Append to the chapter's audit trail; failures only reach the process log
    async fn audit(&self, chapter_id: &str, level: LogLevel, message: &str, data: Option<serde_json::Value>) {
        if let Err(e) = self.chapters.append_log(chapter_id, level, message, data).await {
            warn!("Could not append log to chapter {}: {}", chapter_id, e);
        }
    }
}
