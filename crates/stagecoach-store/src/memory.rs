use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagecoach_core::{
    truncate_error, Agent, AgentExecution, Project, Stage, StagecoachError, StagecoachResult,
    Task, TaskStatus,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::default_agents;
use crate::store::{AgentStore, ExecutionStats, ExecutionStore, ProjectStore, TaskStore};

/// In-memory store backing all four persistence traits.
///
/// Tables are insertion-ordered vectors, which is what gives `tasks_for`
/// and `agents_for_stage` their creation-order guarantee. Suitable for the
/// CLI, tests, and single-process deployments.
pub struct MemoryStore {
    projects: RwLock<Vec<Project>>,
    agents: RwLock<Vec<Agent>>,
    tasks: RwLock<Vec<Task>>,
    executions: RwLock<Vec<AgentExecution>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(Vec::new()),
            agents: RwLock::new(Vec::new()),
            tasks: RwLock::new(Vec::new()),
            executions: RwLock::new(Vec::new()),
        }
    }

    /// Creates a store pre-loaded with the default agent roster.
    pub fn seeded() -> Self {
        Self {
            projects: RwLock::new(Vec::new()),
            agents: RwLock::new(default_agents()),
            tasks: RwLock::new(Vec::new()),
            executions: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn insert_project(&self, project: &Project) -> StagecoachResult<()> {
        let mut projects = self.projects.write().await;
        projects.push(project.clone());
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> StagecoachResult<Option<Project>> {
        let projects = self.projects.read().await;
        Ok(projects.iter().find(|p| p.id == id).cloned())
    }

    async fn update_project(&self, project: &Project) -> StagecoachResult<()> {
        let mut projects = self.projects.write().await;
        let slot = projects
            .iter_mut()
            .find(|p| p.id == project.id)
            .ok_or(StagecoachError::ProjectNotFound(project.id))?;
        *slot = project.clone();
        Ok(())
    }

    async fn list_projects(&self) -> StagecoachResult<Vec<Project>> {
        let projects = self.projects.read().await;
        Ok(projects.clone())
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn insert_agent(&self, agent: &Agent) -> StagecoachResult<()> {
        let mut agents = self.agents.write().await;
        agents.push(agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: Uuid) -> StagecoachResult<Option<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents.iter().find(|a| a.id == id).cloned())
    }

    async fn get_agent_by_name(&self, name: &str) -> StagecoachResult<Option<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents.iter().find(|a| a.name == name).cloned())
    }

    async fn update_agent(&self, agent: &Agent) -> StagecoachResult<()> {
        let mut agents = self.agents.write().await;
        let slot = agents
            .iter_mut()
            .find(|a| a.id == agent.id)
            .ok_or(StagecoachError::AgentNotFound(agent.id))?;
        *slot = agent.clone();
        Ok(())
    }

    async fn agents_for_stage(&self, stage: Stage) -> StagecoachResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents
            .iter()
            .filter(|a| a.is_active && a.stage == stage)
            .cloned()
            .collect())
    }

    async fn list_agents(&self) -> StagecoachResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents.clone())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: &Task) -> StagecoachResult<()> {
        let mut tasks = self.tasks.write().await;
        tasks.push(task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> StagecoachResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn tasks_for(
        &self,
        project_id: Uuid,
        stage: Option<Stage>,
        status: Option<TaskStatus>,
    ) -> StagecoachResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .filter(|t| stage.map_or(true, |s| t.stage == s))
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect())
    }

    async fn ensure_tasks_for_stage(
        &self,
        project_id: Uuid,
        stage: Stage,
    ) -> StagecoachResult<Vec<Task>> {
        let stage_agents = self.agents_for_stage(stage).await?;

        let mut tasks = self.tasks.write().await;
        for agent in &stage_agents {
            let exists = tasks.iter().any(|t| {
                t.project_id == project_id && t.agent_id == Some(agent.id) && t.stage == stage
            });
            if !exists {
                tasks.push(Task::for_agent(project_id, agent));
            }
        }

        Ok(tasks
            .iter()
            .filter(|t| t.project_id == project_id && t.stage == stage)
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        task_id: Uuid,
        next: TaskStatus,
        error: Option<String>,
    ) -> StagecoachResult<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(StagecoachError::TaskNotFound(task_id))?;

        if !task.status.can_transition(next) {
            return Err(StagecoachError::InvalidTransition {
                from: task.status,
                to: next,
            });
        }

        match next {
            TaskStatus::Processing => task.started_at = Some(Utc::now()),
            TaskStatus::Completed => task.completed_at = Some(Utc::now()),
            TaskStatus::Failed => task.error_message = error.as_deref().map(truncate_error),
            // The stale-requeue edge hands the task back untouched.
            TaskStatus::Pending => task.started_at = None,
            TaskStatus::Cancelled => {}
        }
        task.status = next;
        Ok(task.clone())
    }

    async fn requeue_stale(
        &self,
        project_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StagecoachResult<Vec<Task>> {
        let mut tasks = self.tasks.write().await;
        let mut requeued = Vec::new();
        for task in tasks.iter_mut().filter(|t| {
            t.project_id == project_id
                && t.status == TaskStatus::Processing
                && t.started_at.is_some_and(|started| started < cutoff)
        }) {
            task.status = TaskStatus::Pending;
            task.started_at = None;
            requeued.push(task.clone());
        }
        Ok(requeued)
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn insert_execution(&self, execution: &AgentExecution) -> StagecoachResult<()> {
        let mut executions = self.executions.write().await;
        executions.push(execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> StagecoachResult<Option<AgentExecution>> {
        let executions = self.executions.read().await;
        Ok(executions.iter().find(|e| e.id == id).cloned())
    }

    async fn backfill_duration(&self, id: Uuid, duration_ms: u64) -> StagecoachResult<()> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StagecoachError::Store(format!("Execution not found: {id}")))?;
        execution.duration_ms = duration_ms;
        Ok(())
    }

    async fn executions_for_project(
        &self,
        project_id: Uuid,
    ) -> StagecoachResult<Vec<AgentExecution>> {
        let executions = self.executions.read().await;
        Ok(executions
            .iter()
            .filter(|e| e.project_id == Some(project_id))
            .cloned()
            .collect())
    }

    async fn stats(&self) -> StagecoachResult<ExecutionStats> {
        let executions = self.executions.read().await;
        let total = executions.len() as u64;
        if total == 0 {
            return Ok(ExecutionStats::default());
        }
        let successful = executions.iter().filter(|e| e.success).count() as u64;
        let total_duration: u64 = executions.iter().map(|e| e.duration_ms).sum();
        Ok(ExecutionStats {
            total_executions: total,
            successful,
            success_rate: successful as f64 * 100.0 / total as f64,
            total_tokens: executions.iter().map(|e| e.tokens_used).sum(),
            total_cost: executions.iter().map(|e| e.cost).sum(),
            avg_duration_ms: total_duration as f64 / total as f64,
        })
    }
}
