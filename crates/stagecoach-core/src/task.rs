use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::Agent;
use crate::project::Stage;

/// Maximum stored length of a task error message, in characters.
pub const MAX_ERROR_LEN: usize = 500;

/// Truncates a failure message to [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_LEN).collect()
}

/// Status of a pipeline task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet picked up by a stage run.
    Pending,
    /// An execution is in flight for this task.
    Processing,
    /// The execution succeeded. Terminal.
    Completed,
    /// The execution failed or raised. Terminal.
    Failed,
    /// Abandoned before completion. Terminal.
    Cancelled,
}

impl TaskStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Completed, failed and cancelled admit no further transitions.
    /// Processing may fall back to pending, the edge the stale-task
    /// requeue uses.
    pub fn can_transition(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Cancelled)
                | (TaskStatus::Processing, TaskStatus::Pending)
        )
    }

    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The tracked unit of work for one agent within one project stage.
///
/// At most one task exists per (project, agent, stage) triple; re-entering
/// a stage reuses the existing task instead of duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: Uuid,
    /// The project this task belongs to.
    pub project_id: Uuid,
    /// The agent responsible for this task. Tasks without one are skipped
    /// by the stage runner.
    pub agent_id: Option<Uuid>,
    /// Optional parent for subtask trees, stored as an id rather than a
    /// live reference.
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Short display title.
    pub title: String,
    /// What this task is about.
    pub description: String,
    /// Stage copied from the owning agent at creation time.
    pub stage: Stage,
    /// Current state-machine position.
    pub status: TaskStatus,
    /// Set only on transition to failed, truncated to [`MAX_ERROR_LEN`].
    pub error_message: Option<String>,
    /// UTC timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Set on entering processing, cleared on a stale requeue.
    pub started_at: Option<DateTime<Utc>>,
    /// Set on entering completed.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a pending task not bound to any agent.
    pub fn new(project_id: Uuid, title: impl Into<String>, stage: Stage) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            agent_id: None,
            parent_id: None,
            title: title.into(),
            description: String::new(),
            stage,
            status: TaskStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Creates the canonical pending task for an agent's work in its stage.
    pub fn for_agent(project_id: Uuid, agent: &Agent) -> Self {
        let mut task = Self::new(
            project_id,
            format!("{} - Stage {}", agent.name, agent.stage),
            agent.stage,
        );
        task.agent_id = Some(agent.id);
        task.description = format!("Automated task for {}", agent.name);
        task
    }

    /// Attaches this task to a parent task.
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(TaskStatus::Pending.can_transition(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_transition(TaskStatus::Completed));
        assert!(TaskStatus::Processing.can_transition(TaskStatus::Failed));
        assert!(TaskStatus::Processing.can_transition(TaskStatus::Pending));
        assert!(TaskStatus::Pending.can_transition(TaskStatus::Cancelled));
    }

    #[test]
    fn test_terminal_statuses_admit_nothing() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                TaskStatus::Pending,
                TaskStatus::Processing,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition(next));
            }
        }
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        assert!(!TaskStatus::Pending.can_transition(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition(TaskStatus::Failed));
    }

    #[test]
    fn test_truncate_error_caps_length() {
        let long = "x".repeat(800);
        assert_eq!(truncate_error(&long).len(), MAX_ERROR_LEN);
        assert_eq!(truncate_error("short"), "short");
    }

    #[test]
    fn test_truncate_error_counts_chars_not_bytes() {
        let long = "é".repeat(600);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_LEN);
    }

    #[test]
    fn test_task_for_agent() {
        use crate::agent::Agent;
        let project_id = Uuid::new_v4();
        let agent = Agent::new("Idea Processor", Stage::FIRST, "idea analysis");
        let task = Task::for_agent(project_id, &agent);
        assert_eq!(task.title, "Idea Processor - Stage 1");
        assert_eq!(task.agent_id, Some(agent.id));
        assert_eq!(task.stage, Stage::FIRST);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
    }

    #[test]
    fn test_task_with_parent() {
        let parent = Uuid::new_v4();
        let task = Task::new(Uuid::new_v4(), "subtask", Stage::FIRST).with_parent(parent);
        assert_eq!(task.parent_id, Some(parent));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let parsed: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TaskStatus::Processing);
    }
}
