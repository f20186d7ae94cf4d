/*!
 * Chapter records and their append-only audit trail.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::ChapterStatus;

/// Severity of a chapter log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    /// Suppressed, best-effort failures (e.g. context extraction)
    Warn,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Success => write!(f, "success"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "success" => Ok(LogLevel::Success),
            _ => Err(anyhow::anyhow!("Invalid log level: {}", s)),
        }
    }
}

/// One entry of a chapter's audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Structured payload (error details, token counts, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ChapterLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            data,
        }
    }
}

/// A chapter of a story, the unit of work of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub story_id: String,
    pub chapter_number: u32,
    pub title: String,
    pub original_content: String,
    pub translated_content: Option<String>,
    pub status: ChapterStatus,
    #[serde(default)]
    pub logs: Vec<ChapterLogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chapter {
    /// Create a new pending chapter with a generated id
    pub fn new(
        story_id: impl Into<String>,
        chapter_number: u32,
        title: impl Into<String>,
        original_content: impl Into<String>,
    ) -> Self {
        Self::with_id(
            uuid::Uuid::new_v4().to_string(),
            story_id,
            chapter_number,
            title,
            original_content,
        )
    }

    /// Create a new pending chapter with a caller-chosen id
    pub fn with_id(
        id: impl Into<String>,
        story_id: impl Into<String>,
        chapter_number: u32,
        title: impl Into<String>,
        original_content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            story_id: story_id.into(),
            chapter_number,
            title: title.into(),
            original_content: original_content.into(),
            translated_content: None,
            status: ChapterStatus::Pending,
            logs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether there is any source text to translate
    pub fn has_content(&self) -> bool {
        !self.original_content.trim().is_empty()
    }
}

/// Partial chapter write.
///
/// Fields left as `None` are not touched. A status change is validated
/// against the state machine by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterUpdate {
    pub status: Option<ChapterStatus>,
    pub translated_content: Option<String>,
}

impl ChapterUpdate {
    pub fn status(status: ChapterStatus) -> Self {
        Self {
            status: Some(status),
            translated_content: None,
        }
    }

    /// Translated text together with the `completed` status
    pub fn completed(translated_content: String) -> Self {
        Self {
            status: Some(ChapterStatus::Completed),
            translated_content: Some(translated_content),
        }
    }
}
