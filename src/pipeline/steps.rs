/*!
 * Named pipeline steps and per-chapter outcomes.
 */

use serde::Serialize;
use std::fmt;

use crate::chapter::ChapterStatus;
use crate::errors::PipelineError;
use crate::translation::TokenUsageStats;

/// Steps of a chapter run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    LoadValidate,
    Translate,
    Persist,
    ExtractContext,
    MergeContext,
}

impl StepName {
    pub const ALL: [StepName; 5] = [
        StepName::LoadValidate,
        StepName::Translate,
        StepName::Persist,
        StepName::ExtractContext,
        StepName::MergeContext,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepName::LoadValidate => "load-validate",
            StepName::Translate => "translate",
            StepName::Persist => "persist",
            StepName::ExtractContext => "extract-context",
            StepName::MergeContext => "merge-context",
        }
    }

    /// Failures after the chapter is completed do not fail it
    pub fn is_best_effort(self) -> bool {
        matches!(self, StepName::ExtractContext | StepName::MergeContext)
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    /// Step ran but had nothing to do
    Skipped { reason: String },
    Failed { error: String, retryable: bool },
}

impl StepOutcome {
    pub fn failed(error: &PipelineError) -> Self {
        StepOutcome::Failed {
            error: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        StepOutcome::Skipped { reason: reason.into() }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }
}

/// One executed step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub chapter_id: String,
    pub step: StepName,
    pub attempts: u32,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// How a chapter run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    Completed,
    Failed,
    /// Not processed (already translating or completed, or unknown id)
    Skipped,
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunResult::Completed => write!(f, "completed"),
            RunResult::Failed => write!(f, "failed"),
            RunResult::Skipped => write!(f, "skipped"),
        }
    }
}

/// Everything known about one chapter run
#[derive(Debug, Clone)]
pub struct ChapterOutcome {
    pub chapter_id: String,
    pub result: RunResult,
    /// Status the chapter was left in, when it could be read
    pub final_status: Option<ChapterStatus>,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
    pub usage: TokenUsageStats,
}

impl ChapterOutcome {
    pub fn new(chapter_id: impl Into<String>) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            result: RunResult::Skipped,
            final_status: None,
            steps: Vec::new(),
            error: None,
            usage: TokenUsageStats::new(),
        }
    }

    pub fn record(&mut self, step: StepName, attempts: u32, outcome: StepOutcome) {
        self.steps.push(StepRecord {
            chapter_id: self.chapter_id.clone(),
            step,
            attempts,
            outcome,
        });
    }

    pub fn step(&self, step: StepName) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == step)
    }

    pub fn is_completed(&self) -> bool {
        self.result == RunResult::Completed
    }
}
