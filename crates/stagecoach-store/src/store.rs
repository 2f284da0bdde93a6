use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagecoach_core::{Agent, AgentExecution, Project, Stage, StagecoachResult, Task, TaskStatus};
use uuid::Uuid;

/// CRUD surface for projects.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Persists a new project.
    async fn insert_project(&self, project: &Project) -> StagecoachResult<()>;
    /// Looks a project up by id.
    async fn get_project(&self, id: Uuid) -> StagecoachResult<Option<Project>>;
    /// Writes a project back in full.
    async fn update_project(&self, project: &Project) -> StagecoachResult<()>;
    /// Every project, in creation order.
    async fn list_projects(&self) -> StagecoachResult<Vec<Project>>;
}

/// CRUD surface for agents.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Persists a new agent.
    async fn insert_agent(&self, agent: &Agent) -> StagecoachResult<()>;
    /// Looks an agent up by id.
    async fn get_agent(&self, id: Uuid) -> StagecoachResult<Option<Agent>>;
    /// Looks an agent up by its unique display name.
    async fn get_agent_by_name(&self, name: &str) -> StagecoachResult<Option<Agent>>;
    /// Writes an agent back in full, counters included.
    async fn update_agent(&self, agent: &Agent) -> StagecoachResult<()>;

    /// Active agents bound to `stage`, in creation order.
    async fn agents_for_stage(&self, stage: Stage) -> StagecoachResult<Vec<Agent>>;

    /// Every agent, active or not, in creation order.
    async fn list_agents(&self) -> StagecoachResult<Vec<Agent>>;
}

/// Task lifecycle: lookup, idempotent per-stage upsert, validated
/// transitions, and the stale-task sweep.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persists a new task.
    async fn insert_task(&self, task: &Task) -> StagecoachResult<()>;
    /// Looks a task up by id.
    async fn get_task(&self, id: Uuid) -> StagecoachResult<Option<Task>>;

    /// Tasks of a project in creation order, optionally narrowed by stage
    /// and status.
    async fn tasks_for(
        &self,
        project_id: Uuid,
        stage: Option<Stage>,
        status: Option<TaskStatus>,
    ) -> StagecoachResult<Vec<Task>>;

    /// Guarantees the canonical task exists for every active agent of
    /// `stage`, creating pending ones where missing, then returns all tasks
    /// of that project/stage in creation order (agentless ones included).
    ///
    /// Idempotent: a second call creates nothing and returns the same set.
    async fn ensure_tasks_for_stage(
        &self,
        project_id: Uuid,
        stage: Stage,
    ) -> StagecoachResult<Vec<Task>>;

    /// Moves a task along the status state machine, stamping
    /// `started_at`/`completed_at` and truncating the error message.
    /// Fails with `InvalidTransition` when the edge is not legal.
    async fn transition(
        &self,
        task_id: Uuid,
        next: TaskStatus,
        error: Option<String>,
    ) -> StagecoachResult<Task>;

    /// Resets processing tasks of a project whose `started_at` lies before
    /// `cutoff` back to pending, clearing `started_at`. Returns the tasks
    /// that were requeued.
    async fn requeue_stale(
        &self,
        project_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StagecoachResult<Vec<Task>>;
}

/// Append-only log of execution attempts plus the duration backfill.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Appends one execution record.
    async fn insert_execution(&self, execution: &AgentExecution) -> StagecoachResult<()>;
    /// Looks an execution record up by id.
    async fn get_execution(&self, id: Uuid) -> StagecoachResult<Option<AgentExecution>>;

    /// Writes the wall-clock duration onto an already persisted record.
    /// The one permitted mutation of an execution record.
    async fn backfill_duration(&self, id: Uuid, duration_ms: u64) -> StagecoachResult<()>;

    /// Execution records for a project, oldest first.
    async fn executions_for_project(&self, project_id: Uuid)
        -> StagecoachResult<Vec<AgentExecution>>;

    /// Aggregates over every execution record in the store.
    async fn stats(&self) -> StagecoachResult<ExecutionStats>;
}

/// Aggregate view over the execution log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Number of recorded attempts.
    pub total_executions: u64,
    /// Attempts with `success == true`.
    pub successful: u64,
    /// `successful / total`, as a percentage. 0 with no records.
    pub success_rate: f64,
    /// Sum of reported token usage.
    pub total_tokens: u64,
    /// Sum of reported cost.
    pub total_cost: f64,
    /// Mean wall-clock duration. 0 with no records.
    pub avg_duration_ms: f64,
}
