/*!
 * Mock provider implementations for testing.
 *
 * This module provides a deterministic provider that simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds with "translated" text
 * - `MockProvider::intermittent(n)` - Fails every nth request with a 503
 * - `MockProvider::failing()` - Always fails with an error
 * - `MockProvider::empty()` - Returns empty completions
 *
 * Scripted results and a custom responder take precedence over the behavior,
 * and every request is recorded for assertions.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::providers::{
    Completion, CompletionProvider, CompletionRequest, ResponseFormat, TokenUsage,
};

/// Prefix the working mock puts in front of translated text
pub const MOCK_TRANSLATION_PREFIX: &str = "[TRANSLATED] ";

/// Empty extraction payload returned for JSON requests
pub const EMPTY_CONTEXT_JSON: &str = r#"{"characters":[],"terms":[],"settings":[],"plotPoints":[]}"#;

/// Custom responder; `Err` is returned to the caller as-is
pub type MockResponder = fn(&CompletionRequest) -> Result<String, ProviderError>;

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with a server error
    Failing,
    /// Always fails with an authentication error
    Unauthorized,
    /// Returns empty response
    Empty,
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
}

/// Mock provider for testing pipeline behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    behavior: MockBehavior,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    script: Arc<Mutex<VecDeque<Result<String, ProviderError>>>>,
    responder: Option<MockResponder>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
            responder: None,
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn unauthorized() -> Self {
        Self::new(MockBehavior::Unauthorized)
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Set a custom response generator, used when no scripted result is queued
    pub fn with_responder(mut self, responder: MockResponder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Queue results returned in order before falling back to the behavior
    pub fn with_script(self, results: Vec<Result<String, ProviderError>>) -> Self {
        self.script.lock().extend(results);
        self
    }

    /// Number of `complete` calls so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Copies of every request received, in order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Text the working mock derives from a request
    pub fn translate_text(request: &CompletionRequest) -> String {
        match request.response_format {
            ResponseFormat::JsonObject => EMPTY_CONTEXT_JSON.to_string(),
            ResponseFormat::Text => {
                let body = request
                    .user_prompt
                    .split_once("\n\n")
                    .map(|(_, body)| body)
                    .unwrap_or(&request.user_prompt);
                format!("{}{}", MOCK_TRANSLATION_PREFIX, body)
            }
        }
    }

    fn completion(request: &CompletionRequest, text: String) -> Completion {
        let usage = TokenUsage {
            prompt_tokens: ((request.system_prompt.chars().count() + request.user_prompt.chars().count()) / 4) as u64,
            completion_tokens: (text.chars().count() / 4) as u64,
        };
        Completion {
            text,
            usage: Some(usage),
        }
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let scripted = self.script.lock().pop_front();
        if let Some(result) = scripted {
            return result.map(|text| Self::completion(&request, text));
        }

        if let Some(responder) = self.responder {
            return responder(&request).map(|text| Self::completion(&request, text));
        }

        match self.behavior {
            MockBehavior::Working => {
                let text = Self::translate_text(&request);
                Ok(Self::completion(&request, text))
            }

            MockBehavior::Intermittent { fail_every } => {
                if fail_every > 0 && count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    let text = Self::translate_text(&request);
                    Ok(Self::completion(&request, text))
                }
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Unauthorized => Err(ProviderError::AuthenticationError(
                "Simulated invalid API key".to_string(),
            )),

            MockBehavior::Empty => Ok(Completion {
                text: String::new(),
                usage: Some(TokenUsage::default()),
            }),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                let text = Self::translate_text(&request);
                Ok(Self::completion(&request, text))
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
