/*!
 * Chapter status state machine.
 *
 * Legal transitions:
 * - `pending -> translating` on job pickup, before any external call
 * - `translating -> completed` once the translated text is persisted
 * - `translating -> failed` on an unrecovered translation or persistence error
 * - `failed -> pending` on explicit resubmission only
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Translation status of a chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    /// Waiting to be picked up
    Pending,
    /// A job owns the chapter and is translating it
    Translating,
    /// Translated text is stored
    Completed,
    /// The last run ended with an unrecovered error
    Failed,
}

/// Rejected status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: ChapterStatus,
    pub to: ChapterStatus,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal chapter status transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

impl ChapterStatus {
    /// All states, in lifecycle order
    pub const ALL: [ChapterStatus; 4] = [
        ChapterStatus::Pending,
        ChapterStatus::Translating,
        ChapterStatus::Completed,
        ChapterStatus::Failed,
    ];

    /// Whether `self -> next` is one of the four legal edges
    pub fn can_transition_to(self, next: ChapterStatus) -> bool {
        matches!(
            (self, next),
            (ChapterStatus::Pending, ChapterStatus::Translating)
                | (ChapterStatus::Translating, ChapterStatus::Completed)
                | (ChapterStatus::Translating, ChapterStatus::Failed)
                | (ChapterStatus::Failed, ChapterStatus::Pending)
        )
    }

    /// Validate a status write.
    ///
    /// Returns `Ok(false)` when the chapter already has `next` (an idempotent
    /// rewrite, not a transition) and `Ok(true)` for a real transition.
    /// Writing `translating` is the pickup claim and is never idempotent: a
    /// chapter another job already owns is rejected.
    pub fn transition(self, next: ChapterStatus) -> Result<bool, IllegalTransition> {
        if self == next && next != ChapterStatus::Translating {
            return Ok(false);
        }
        if self.can_transition_to(next) {
            Ok(true)
        } else {
            Err(IllegalTransition { from: self, to: next })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChapterStatus::Pending => "pending",
            ChapterStatus::Translating => "translating",
            ChapterStatus::Completed => "completed",
            ChapterStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChapterStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ChapterStatus::Pending),
            "translating" => Ok(ChapterStatus::Translating),
            "completed" => Ok(ChapterStatus::Completed),
            "failed" => Ok(ChapterStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid chapter status: {}", s)),
        }
    }
}
