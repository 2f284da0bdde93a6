//! Ollama chat backend for local models.

use std::time::Duration;

use async_trait::async_trait;
use stagecoach_core::{StagecoachError, StagecoachResult};
use tracing::debug;

use crate::backend::{Completion, CompletionBackend, CompletionRequest};

/// Address of a local Ollama daemon.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ceiling on a single completion call. Local models can take minutes on
/// large prompts.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Talks to Ollama's `/api/chat` endpoint with streaming disabled.
pub struct OllamaBackend {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaBackend {
    /// Connects to the daemon at `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> StagecoachResult<Self> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Connects with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> StagecoachResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StagecoachError::Provider(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    async fn complete(&self, request: &CompletionRequest) -> StagecoachResult<Completion> {
        let url = format!("{}/api/chat", self.base_url);

        let mut messages: Vec<serde_json::Value> = Vec::new();
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": request.prompt
        }));

        let body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });

        debug!(model = %request.model, url = %url, "requesting completion");

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(StagecoachError::Provider(format!(
                "Ollama API error {status}: {error_body}"
            )));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| StagecoachError::Provider(e.to_string()))?;

        let content = resp_body["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let system_chars = request
            .system_prompt
            .as_deref()
            .map_or(0, |s| s.chars().count());
        let input_tokens = estimated_tokens(system_chars + request.prompt.chars().count());
        let output_tokens = estimated_tokens(content.chars().count());

        Ok(Completion {
            content,
            tokens_used: input_tokens + output_tokens,
            cost: 0.0,
            metadata: serde_json::json!({
                "model": request.model,
                "estimated_input_tokens": input_tokens,
                "estimated_output_tokens": output_tokens,
            }),
        })
    }
}

// Rough estimate: one token per four characters of text.
fn estimated_tokens(chars: usize) -> u64 {
    (chars / 4) as u64
}

fn transport_error(e: reqwest::Error) -> StagecoachError {
    if e.is_timeout() {
        StagecoachError::Provider("Request timeout".to_string())
    } else if e.is_connect() {
        StagecoachError::Provider("Connection error".to_string())
    } else {
        StagecoachError::Provider(e.to_string())
    }
}
