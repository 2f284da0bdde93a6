use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::project::Stage;

/// Model identifier agents use unless configured otherwise.
pub const DEFAULT_MODEL: &str = "gpt-oss:20b";

/// Runtime state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// No execution in flight.
    Idle,
    /// An execution is currently in flight.
    Running,
    /// The last execution attempt raised a structural error.
    Error,
    /// Taken out of rotation by an operator.
    Disabled,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Disabled => write!(f, "disabled"),
        }
    }
}

/// A named unit of work bound to one pipeline stage.
///
/// Agents carry their own model parameters and system prompt; the stage
/// runner creates one task per active agent when a stage is entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier.
    pub id: Uuid,
    /// Unique display name.
    pub name: String,
    /// The stage this agent belongs to.
    pub stage: Stage,
    /// What this agent is responsible for, in one sentence.
    pub description: String,
    /// Capability labels folded into the generated system prompt.
    pub capabilities: Vec<String>,
    /// System instructions sent ahead of the project idea.
    pub system_prompt: String,
    /// Model identifier passed to the completion backend.
    pub model: String,
    /// Sampling temperature for the completion backend.
    pub temperature: f64,
    /// Completion length cap for the completion backend.
    pub max_tokens: u32,
    /// Inactive agents get no tasks when a stage is entered.
    pub is_active: bool,
    /// Whether an execution is currently in flight. Returns to idle after
    /// every attempt, success or captured failure.
    pub status: AgentStatus,
    /// Number of execution attempts recorded against this agent.
    pub total_executions: u64,
    /// Running average of per-execution scores (success = 100, failure = 0).
    pub success_rate: f64,
    /// UTC timestamp of the most recent execution attempt.
    pub last_active: Option<DateTime<Utc>>,
    /// UTC timestamp of creation.
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Creates an active, idle agent with default model parameters.
    pub fn new(name: impl Into<String>, stage: Stage, description: impl Into<String>) -> Self {
        let name = name.into();
        let description = description.into();
        let system_prompt = format!("You are an expert {name} agent responsible for {description}");
        Self {
            id: Uuid::new_v4(),
            name,
            stage,
            description,
            capabilities: Vec::new(),
            system_prompt,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            is_active: true,
            status: AgentStatus::Idle,
            total_executions: 0,
            success_rate: 0.0,
            last_active: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the capability labels and folds them into the system prompt.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        if !capabilities.is_empty() {
            self.system_prompt = format!(
                "{}\n\nPerform tasks related to {} with high quality and efficiency.",
                self.system_prompt,
                capabilities.join(", ")
            );
        }
        self.capabilities = capabilities;
        self
    }

    /// Replaces the generated system prompt entirely.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Replaces the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Folds one execution attempt into the running counters.
    ///
    /// `success_rate` is the incremental running average
    /// `(old * (n - 1) + score) / n` with a score of 100 or 0.
    pub fn record_outcome(&mut self, success: bool) {
        self.total_executions += 1;
        let n = self.total_executions as f64;
        let score = if success { 100.0 } else { 0.0 };
        self.success_rate = (self.success_rate * (n - 1.0) + score) / n;
        self.last_active = Some(Utc::now());
    }
}
