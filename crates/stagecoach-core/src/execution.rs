use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted record of one agent execution attempt.
///
/// Written exactly once per attempt. Immutable afterwards, with one
/// exception: `duration_ms` is backfilled once the attempt has been timed,
/// because the record is persisted before the wall-clock duration is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    /// Unique identifier.
    pub id: Uuid,
    /// The agent that was executed.
    pub agent_id: Uuid,
    /// The project the execution ran for, when known.
    pub project_id: Option<Uuid>,
    /// The task the execution ran for, when known.
    pub task_id: Option<Uuid>,
    /// Full prompt sent to the completion backend.
    pub prompt: String,
    /// Response text, or the failure reason when `success` is false.
    pub response: String,
    /// Token usage as reported (or estimated) by the backend.
    pub tokens_used: u64,
    /// Cost as reported by the backend; 0.0 for local inference.
    pub cost: f64,
    /// Wall-clock duration of the attempt, backfilled after persistence.
    pub duration_ms: u64,
    /// Whether the attempt produced a usable response.
    pub success: bool,
    /// Failure reason when `success` is false.
    pub error: Option<String>,
    /// Backend-specific details, opaque to the orchestrator.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// UTC timestamp of the attempt.
    pub created_at: DateTime<Utc>,
}

/// What the executor hands back to the stage runner for one attempt.
///
/// Business failures (timeout, refused connection, malformed response) are
/// not errors here: they come back as `success == false` with `error` set,
/// so a single agent's failure never aborts the stage loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the attempt produced a usable response.
    pub success: bool,
    /// Response text, or the failure reason when `success` is false.
    pub response: String,
    /// Token usage as reported (or estimated) by the backend.
    pub tokens_used: u64,
    /// Cost as reported by the backend.
    pub cost: f64,
    /// Failure reason when `success` is false.
    pub error: Option<String>,
    /// Id of the persisted [`AgentExecution`] record.
    pub execution_id: Uuid,
    /// Backend-specific details, opaque to the orchestrator.
    pub metadata: serde_json::Value,
}
