//! The seam between the executor and whatever model serves it.

use async_trait::async_trait;
use stagecoach_core::{Agent, StagecoachResult};

/// One prompt handed to a completion backend.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier understood by the backend.
    pub model: String,
    /// The user-facing prompt.
    pub prompt: String,
    /// Optional system prompt prepended to the conversation.
    pub system_prompt: Option<String>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Builds a request from an agent's configured model and persona.
    pub fn for_agent(agent: &Agent, prompt: impl Into<String>) -> Self {
        Self {
            model: agent.model.clone(),
            prompt: prompt.into(),
            system_prompt: Some(agent.system_prompt.clone()),
            temperature: agent.temperature,
            max_tokens: agent.max_tokens,
        }
    }
}

/// A successful backend round-trip.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text.
    pub content: String,
    /// Reported or estimated token usage for the full round-trip.
    pub tokens_used: u64,
    /// Cost in dollars. Local backends report 0.0.
    pub cost: f64,
    /// Backend-specific details kept with the execution record.
    pub metadata: serde_json::Value,
}

/// A model endpoint capable of serving completion requests.
///
/// Implementations map transport failures to
/// [`StagecoachError::Provider`](stagecoach_core::StagecoachError::Provider).
/// The executor then records those as failed executions rather than
/// propagating them.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Serves a single completion.
    async fn complete(&self, request: &CompletionRequest) -> StagecoachResult<Completion>;
}
