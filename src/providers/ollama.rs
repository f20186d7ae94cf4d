use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{map_request_error, Completion, CompletionProvider, CompletionRequest, ResponseFormat, TokenUsage};
use crate::errors::ProviderError;

/// Default local server
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    timeout: Duration,
}

/// Chat message object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant, or tool)
    pub role: String,
    pub content: String,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize)]
pub struct GenerationOptions {
    temperature: f32,
    /// Maximum number of tokens to generate
    num_predict: u32,
}

/// Chat request for the Ollama API
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    options: GenerationOptions,
    /// Format to return a response in
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    stream: bool,
}

/// Chat response from the Ollama API
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
    /// Number of prompt tokens
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(default)]
    pub eval_count: Option<u64>,
}

impl ChatRequest {
    pub fn from_request(request: &CompletionRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_prompt.clone(),
                },
            ],
            options: GenerationOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            format: match request.response_format {
                ResponseFormat::Text => None,
                ResponseFormat::JsonObject => Some("json".to_string()),
            },
            stream: false,
        }
    }
}

impl Ollama {
    /// Create a client from a base URL; empty selects the local default
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let url = url.into();
        let base_url = if url.is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            url.trim_end_matches('/').to_string()
        };
        Self {
            base_url,
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            timeout,
        }
    }

    /// Parse a chat response, tolerating a streamed JSONL body
    pub fn parse_chat_response(body: &str) -> Result<ChatResponse, ProviderError> {
        if let Ok(parsed) = serde_json::from_str::<ChatResponse>(body) {
            return Ok(parsed);
        }

        let mut content = String::new();
        let mut last: Option<ChatResponse> = None;
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let part = serde_json::from_str::<ChatResponse>(line)
                .map_err(|e| ProviderError::ParseError(format!("Invalid Ollama response line: {}", e)))?;
            content.push_str(&part.message.content);
            last = Some(part);
        }

        let mut last = last.ok_or_else(|| ProviderError::ParseError("Empty Ollama response".to_string()))?;
        last.message.content = content;
        Ok(last)
    }
}

#[async_trait]
impl CompletionProvider for Ollama {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest::from_request(&request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Ollama API error ({}): {}", status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let parsed = Self::parse_chat_response(&response_text)?;

        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(TokenUsage {
                prompt_tokens: prompt.unwrap_or(0),
                completion_tokens: completion.unwrap_or(0),
            }),
        };

        Ok(Completion {
            text: parsed.message.content,
            usage,
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
