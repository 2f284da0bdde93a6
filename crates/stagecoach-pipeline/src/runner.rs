//! Single-stage execution. This is the one place that creates tasks,
//! runs agents, and moves a project forward, so manual advances,
//! synchronous fallbacks, and auto-runs cannot drift apart.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use stagecoach_agent::AgentExecutor;
use stagecoach_core::{AgentStatus, Stage, StagecoachError, StagecoachResult, Task, TaskStatus};
use stagecoach_store::{AgentStore, ProjectStore, TaskStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::{EventSink, PipelineEvent};
use crate::progress::ProgressTracker;

/// Outcome of one agent's task within a stage run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// Agent name, or the task title when the agent is gone.
    pub agent: String,
    /// Task status after the run.
    pub status: TaskStatus,
    /// Execution record id when the executor ran for this task.
    pub execution_id: Option<Uuid>,
    /// Failure reason, already truncated for storage.
    pub error: Option<String>,
}

/// Result of running one stage for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    /// Project the stage ran for.
    pub project_id: Uuid,
    /// Stage number that ran.
    pub stage: u8,
    /// Number of tasks considered (one per bound agent).
    pub agents_triggered: usize,
    /// Per-agent outcomes in task creation order.
    pub outcomes: Vec<AgentOutcome>,
}

/// One stage's entry in an auto-run walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StageRunEntry {
    /// The stage ran to the end.
    Completed {
        /// Stage number.
        stage: u8,
        /// The stage's report.
        report: StageReport,
    },
    /// The stage aborted with a structural error.
    Failed {
        /// Stage number.
        stage: u8,
        /// What went wrong.
        error: String,
    },
}

impl StageRunEntry {
    /// The stage this entry belongs to.
    pub fn stage(&self) -> u8 {
        match self {
            Self::Completed { stage, .. } | Self::Failed { stage, .. } => *stage,
        }
    }
}

/// Result of walking every remaining stage of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRunReport {
    /// Project the walk ran for.
    pub project_id: Uuid,
    /// Project stage after the walk.
    pub final_stage: u8,
    /// Per-stage entries in walk order.
    pub stages: Vec<StageRunEntry>,
    /// True when the walk was cancelled before reaching the end.
    pub partial: bool,
}

/// Runs stages end to end: task upkeep, agent execution, project
/// advancement, and progress recomputation.
pub struct StageRunner {
    projects: Arc<dyn ProjectStore>,
    agents: Arc<dyn AgentStore>,
    tasks: Arc<dyn TaskStore>,
    executor: Arc<AgentExecutor>,
    events: Arc<dyn EventSink>,
    progress: ProgressTracker,
    stale_after: Duration,
}

impl StageRunner {
    /// Creates a runner over the given stores and executor.
    ///
    /// `stale_after` is the age at which a `processing` task left behind
    /// by a crashed run is handed back to `pending`.
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        agents: Arc<dyn AgentStore>,
        tasks: Arc<dyn TaskStore>,
        executor: Arc<AgentExecutor>,
        events: Arc<dyn EventSink>,
        stale_after: Duration,
    ) -> Self {
        let progress = ProgressTracker::new(projects.clone(), tasks.clone());
        Self {
            projects,
            agents,
            tasks,
            executor,
            events,
            progress,
            stale_after,
        }
    }

    /// Runs `stage` for the project.
    ///
    /// Ensures the stage's task set exists, executes each pending task in
    /// creation order, then moves the project's stage forward (monotonic)
    /// and recomputes completion. Completed tasks are reported without
    /// re-execution, which is what makes re-entering a stage safe.
    ///
    /// Per-task failures are folded into the report. Only a missing
    /// project or a failing store aborts the call. Cancellation stops
    /// the run between tasks, closes an in-flight task as `cancelled`,
    /// and leaves the project's stage untouched.
    pub async fn run_stage(
        &self,
        project_id: Uuid,
        stage: Stage,
        cancel: &CancellationToken,
    ) -> StagecoachResult<StageReport> {
        let project = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or(StagecoachError::ProjectNotFound(project_id))?;

        info!(project = %project.name, stage = %stage, "running stage");

        self.events
            .emit(PipelineEvent::StageAdvancing {
                project_id,
                from: project.stage.get(),
                to: stage.get(),
            })
            .await;

        // Hand tasks stranded by a crashed run back to pending before
        // deciding what to execute.
        let cutoff = Utc::now() - chrono::Duration::seconds(self.stale_after.as_secs() as i64);
        let stale = self.tasks.requeue_stale(project_id, cutoff).await?;
        if !stale.is_empty() {
            warn!(
                project = %project_id,
                count = stale.len(),
                "requeued stale processing tasks"
            );
        }

        let tasks = self.tasks.ensure_tasks_for_stage(project_id, stage).await?;
        let mut outcomes = Vec::with_capacity(tasks.len());

        for task in &tasks {
            if cancel.is_cancelled() {
                info!(project = %project_id, stage = %stage, "stage run cancelled");
                break;
            }

            // Fresh read: a concurrent invocation may have moved this
            // task while the previous one was executing.
            let task = self
                .tasks
                .get_task(task.id)
                .await?
                .ok_or(StagecoachError::TaskNotFound(task.id))?;

            if let Some(outcome) = self.run_task(&task, cancel).await? {
                outcomes.push(outcome);
            }
        }

        if !cancel.is_cancelled() {
            // Re-read before advancing; the executions above are
            // suspension points.
            let mut project = self
                .projects
                .get_project(project_id)
                .await?
                .ok_or(StagecoachError::ProjectNotFound(project_id))?;
            project.enter_stage(stage);
            self.projects.update_project(&project).await?;
        }

        self.progress.recompute(project_id).await?;

        Ok(StageReport {
            project_id,
            stage: stage.get(),
            agents_triggered: outcomes.len(),
            outcomes,
        })
    }

    /// Walks stages from the project's current one through the final
    /// one, pausing `delay` between stages so a busy local endpoint can
    /// settle.
    ///
    /// The current stage is re-entered first; completed tasks make that
    /// a no-op. The first stage-level error aborts the walk with a
    /// `Failed` entry. Cancellation during a pause or a stage stops the
    /// walk cleanly and marks the report partial.
    pub async fn auto_run(
        &self,
        project_id: Uuid,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> StagecoachResult<AutoRunReport> {
        let project = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or(StagecoachError::ProjectNotFound(project_id))?;

        info!(project = %project.name, from_stage = %project.stage, "auto-run starting");

        let mut stages = Vec::new();
        let mut partial = false;

        for stage in project.stage.through_final() {
            match self.run_stage(project_id, stage, cancel).await {
                Ok(report) => {
                    stages.push(StageRunEntry::Completed {
                        stage: stage.get(),
                        report,
                    });
                }
                Err(e) => {
                    warn!(project = %project_id, stage = %stage, error = %e, "auto-run aborted");
                    stages.push(StageRunEntry::Failed {
                        stage: stage.get(),
                        error: e.to_string(),
                    });
                    break;
                }
            }

            if cancel.is_cancelled() {
                partial = true;
                break;
            }

            if stage != Stage::FINAL {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        info!(project = %project_id, "auto-run cancelled during inter-stage delay");
                        partial = true;
                        break;
                    }
                }
            }
        }

        let project = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or(StagecoachError::ProjectNotFound(project_id))?;

        Ok(AutoRunReport {
            project_id,
            final_stage: project.stage.get(),
            stages,
            partial,
        })
    }

    /// Handles one task. Returns `None` for pending tasks with no bound
    /// agent; everything else produces an outcome entry.
    async fn run_task(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> StagecoachResult<Option<AgentOutcome>> {
        match task.status {
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                // Terminal tasks are reported, never re-run.
                return Ok(Some(AgentOutcome {
                    agent: self.agent_label(task).await?,
                    status: task.status,
                    execution_id: None,
                    error: task.error_message.clone(),
                }));
            }
            TaskStatus::Processing => {
                // Another invocation owns this task right now.
                return Ok(Some(AgentOutcome {
                    agent: self.agent_label(task).await?,
                    status: task.status,
                    execution_id: None,
                    error: None,
                }));
            }
            TaskStatus::Pending => {}
        }

        let Some(agent_id) = task.agent_id else {
            return Ok(None);
        };
        let agent = self
            .agents
            .get_agent(agent_id)
            .await?
            .ok_or(StagecoachError::AgentNotFound(agent_id))?;

        // The prompt is the project's idea text, read fresh each time.
        let project = self
            .projects
            .get_project(task.project_id)
            .await?
            .ok_or(StagecoachError::ProjectNotFound(task.project_id))?;

        self.events
            .emit(PipelineEvent::TaskProcessing {
                project_id: task.project_id,
                task_id: task.id,
                agent: agent.name.clone(),
                stage: task.stage.get(),
            })
            .await;

        self.tasks
            .transition(task.id, TaskStatus::Processing, None)
            .await?;

        let call = tokio::select! {
            result = self
                .executor
                .execute(agent.id, &project.idea, Some(task.project_id), Some(task.id)) =>
            {
                Some(result)
            }
            _ = cancel.cancelled() => None,
        };

        match call {
            None => {
                // Interrupted mid-flight: close the task out instead of
                // leaving it stranded in processing, and hand the agent
                // back to idle since its dropped execution never will.
                let task = self
                    .tasks
                    .transition(task.id, TaskStatus::Cancelled, None)
                    .await?;
                if let Some(mut agent) = self.agents.get_agent(agent.id).await? {
                    if agent.status == AgentStatus::Running {
                        agent.status = AgentStatus::Idle;
                        self.agents.update_agent(&agent).await?;
                    }
                }
                info!(task = %task.id, agent = %agent.name, "task cancelled");
                Ok(Some(AgentOutcome {
                    agent: agent.name,
                    status: task.status,
                    execution_id: None,
                    error: None,
                }))
            }
            Some(Ok(result)) if result.success => {
                let task = self
                    .tasks
                    .transition(task.id, TaskStatus::Completed, None)
                    .await?;
                self.events
                    .emit(PipelineEvent::TaskCompleted {
                        project_id: task.project_id,
                        task_id: task.id,
                        agent: agent.name.clone(),
                        stage: task.stage.get(),
                    })
                    .await;
                Ok(Some(AgentOutcome {
                    agent: agent.name,
                    status: task.status,
                    execution_id: Some(result.execution_id),
                    error: None,
                }))
            }
            Some(Ok(result)) => {
                // Business failure reported by the backend.
                let error = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string());
                let task = self
                    .tasks
                    .transition(task.id, TaskStatus::Failed, Some(error))
                    .await?;
                self.emit_failed(&task, &agent.name).await;
                Ok(Some(AgentOutcome {
                    agent: agent.name,
                    status: task.status,
                    execution_id: Some(result.execution_id),
                    error: task.error_message,
                }))
            }
            Some(Err(e)) => {
                // The executor itself raised. The task still fails and
                // the stage keeps going.
                warn!(task = %task.id, agent = %agent.name, error = %e, "executor raised");
                let task = self
                    .tasks
                    .transition(task.id, TaskStatus::Failed, Some(e.to_string()))
                    .await?;
                self.emit_failed(&task, &agent.name).await;
                Ok(Some(AgentOutcome {
                    agent: agent.name,
                    status: task.status,
                    execution_id: None,
                    error: task.error_message,
                }))
            }
        }
    }

    /// Resolves the agent name for reporting, falling back to the task
    /// title when the agent is gone or was never bound.
    async fn agent_label(&self, task: &Task) -> StagecoachResult<String> {
        if let Some(agent_id) = task.agent_id {
            if let Some(agent) = self.agents.get_agent(agent_id).await? {
                return Ok(agent.name);
            }
        }
        Ok(task.title.clone())
    }

    async fn emit_failed(&self, task: &Task, agent: &str) {
        self.events
            .emit(PipelineEvent::TaskFailed {
                project_id: task.project_id,
                task_id: task.id,
                agent: agent.to_string(),
                stage: task.stage.get(),
                error: task.error_message.clone().unwrap_or_default(),
            })
            .await;
    }
}
