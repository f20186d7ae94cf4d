/*!
 * Error types for the chapterwai application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::time::Duration;
use thiserror::Error;

use crate::chapter::ChapterStatus;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The call did not finish within its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The provider answered but returned no usable text
    #[error("Provider returned an empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    ///
    /// Client errors (other than 408/429) and authentication failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AuthenticationError(_) => false,
            Self::ApiError { status_code, .. } => {
                *status_code >= 500 || *status_code == 408 || *status_code == 429
            }
            _ => true,
        }
    }

    /// Map a non-success HTTP status into the matching variant
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

/// Errors raised by the chapter and context stores
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The addressed record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A status write would break the chapter state machine
    #[error("Illegal status transition for chapter {chapter_id}: {from} -> {to}")]
    IllegalTransition {
        chapter_id: String,
        from: ChapterStatus,
        to: ChapterStatus,
    },

    /// Optimistic concurrency check failed on a story context write
    #[error("Story context {story_id} changed concurrently (expected version {expected:?}, found {actual:?})")]
    VersionConflict {
        story_id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Transient failures worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::VersionConflict { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Database(error.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(error: anyhow::Error) -> Self {
        Self::Database(format!("{:#}", error))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Database(format!("Corrupt JSON column: {}", error))
    }
}

/// Errors raised while driving a chapter through the pipeline
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Chapter input is unusable (e.g. missing source text)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Completion call failed
    #[error("External API error: {0}")]
    ExternalApi(#[from] ProviderError),

    /// Store read or write failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Context extraction returned something we could not use
    #[error("Context extraction failed: {0}")]
    Extraction(String),
}

impl PipelineError {
    /// Whether the step that raised this error should be attempted again
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::ExternalApi(e) => e.is_retryable(),
            Self::Persistence(e) => e.is_retryable(),
            Self::Extraction(_) => true,
        }
    }
}
