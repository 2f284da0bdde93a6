//! Core types and error definitions for the Stagecoach pipeline.
//!
//! This crate provides the domain model shared across all Stagecoach crates:
//! the project walking through the six-stage pipeline, the agents bound to
//! each stage, the tasks tracking per-agent work, and the execution records
//! written for every agent attempt.
//!
//! # Main types
//!
//! - [`StagecoachError`] — Unified error enum for all Stagecoach subsystems.
//! - [`StagecoachResult`] — Convenience alias for `Result<T, StagecoachError>`.
//! - [`Project`] / [`Stage`] / [`ProjectStatus`] — The venture and its pipeline position.
//! - [`Agent`] / [`AgentStatus`] — A stage-bound unit of work and its runtime state.
//! - [`Task`] / [`TaskStatus`] — Tracked per-(project, agent, stage) work.
//! - [`AgentExecution`] / [`ExecutionResult`] — One execution attempt, persisted and returned.

/// Agents and their runtime counters.
pub mod agent;
/// Execution records and the executor's result contract.
pub mod execution;
/// Projects, pipeline stages, and the stage→status mapping.
pub mod project;
/// Tasks and their status state machine.
pub mod task;

pub use agent::{Agent, AgentStatus, DEFAULT_MODEL};
pub use execution::{AgentExecution, ExecutionResult};
pub use project::{Project, ProjectStatus, Stage};
pub use task::{truncate_error, Task, TaskStatus, MAX_ERROR_LEN};

use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Stagecoach pipeline.
///
/// Structural failures (unknown ids, illegal transitions, the final-stage
/// guard) carry typed payloads so callers can match on them; subsystem
/// failures carry a message.
#[derive(Debug, thiserror::Error)]
pub enum StagecoachError {
    /// No project exists with the given id.
    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    /// No agent exists with the given id.
    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    /// No task exists with the given id.
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    /// A stage number outside `1..=6`.
    #[error("Invalid stage: {0} (expected 1..=6)")]
    InvalidStage(u8),

    /// A task status change that the state machine does not permit.
    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the task currently holds.
        from: TaskStatus,
        /// Status the caller tried to move it to.
        to: TaskStatus,
    },

    /// The project is at stage 6; there is no next stage to advance to.
    #[error("Project {0} is already at the final stage")]
    AlreadyAtFinalStage(Uuid),

    /// An error from the persistence layer.
    #[error("Store error: {0}")]
    Store(String),

    /// An error from the completion backend (HTTP failure, timeout).
    #[error("Provider error: {0}")]
    Provider(String),

    /// An error from the background job queue.
    #[error("Queue error: {0}")]
    Queue(String),

    /// An error in stage or pipeline orchestration itself.
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`StagecoachError`].
pub type StagecoachResult<T> = Result<T, StagecoachError>;
