//! Entry points over the stage runner, with queued dispatch when a job
//! queue is reachable.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagecoach_core::{Stage, StagecoachError, StagecoachResult};
use stagecoach_store::ProjectStore;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::queue::{JobHandle, JobQueue, JobSpec, JobStatus};
use crate::runner::{AutoRunReport, StageReport, StageRunner};

/// Pipeline-wide tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pause between auto-run stages, giving a busy local endpoint time
    /// to settle before the next wave of prompts.
    pub inter_stage_delay: Duration,
    /// Age at which a `processing` task is considered stranded and
    /// handed back to `pending` on the next stage run.
    pub stale_after: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inter_stage_delay: Duration::from_secs(600),
            stale_after: Duration::from_secs(900),
        }
    }
}

/// How a top-level call was serviced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "dispatch", rename_all = "lowercase")]
pub enum Dispatch<T> {
    /// Accepted by the job queue; poll with the handle.
    Queued(JobHandle),
    /// Ran synchronously in the calling context.
    Completed(T),
}

/// Thin entry points over [`StageRunner`].
///
/// The queue is probed once per call. A reachable queue gets the whole
/// job; an unreachable one means the whole job runs here. Stages are
/// never split between the two.
pub struct PipelineController {
    projects: Arc<dyn ProjectStore>,
    runner: Arc<StageRunner>,
    queue: Arc<dyn JobQueue>,
    config: PipelineConfig,
}

impl PipelineController {
    /// Creates a controller over the given runner and queue.
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        runner: Arc<StageRunner>,
        queue: Arc<dyn JobQueue>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            projects,
            runner,
            queue,
            config,
        }
    }

    /// Runs exactly the next stage for the project.
    ///
    /// Fails with [`StagecoachError::AlreadyAtFinalStage`] before any
    /// mutation when the project is already at the final stage.
    pub async fn advance_stage(
        &self,
        project_id: Uuid,
        cancel: &CancellationToken,
    ) -> StagecoachResult<Dispatch<StageReport>> {
        let project = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or(StagecoachError::ProjectNotFound(project_id))?;
        let next = project
            .stage
            .next()
            .ok_or(StagecoachError::AlreadyAtFinalStage(project_id))?;
        self.run_stage(project_id, next, cancel).await
    }

    /// Dispatches one explicit stage, queued when the queue is reachable.
    pub async fn run_stage(
        &self,
        project_id: Uuid,
        stage: Stage,
        cancel: &CancellationToken,
    ) -> StagecoachResult<Dispatch<StageReport>> {
        if let Some(handle) = self
            .queue
            .try_submit(JobSpec::RunStage { project_id, stage })
            .await
        {
            info!(project = %project_id, stage = %stage, job = %handle.id, "stage queued");
            return Ok(Dispatch::Queued(handle));
        }

        let report = self.run_stage_now(project_id, stage, cancel).await?;
        Ok(Dispatch::Completed(report))
    }

    /// Runs one explicit stage synchronously in the calling context.
    ///
    /// This is the fallback path used when no queue is reachable, and
    /// the direct path for callers that want the result in hand.
    pub async fn run_stage_now(
        &self,
        project_id: Uuid,
        stage: Stage,
        cancel: &CancellationToken,
    ) -> StagecoachResult<StageReport> {
        self.runner.run_stage(project_id, stage, cancel).await
    }

    /// Walks every stage from the project's current one to the last.
    pub async fn auto_run(
        &self,
        project_id: Uuid,
        cancel: &CancellationToken,
    ) -> StagecoachResult<Dispatch<AutoRunReport>> {
        if let Some(handle) = self.queue.try_submit(JobSpec::AutoRun { project_id }).await {
            info!(project = %project_id, job = %handle.id, "auto-run queued");
            return Ok(Dispatch::Queued(handle));
        }

        let report = self
            .runner
            .auto_run(project_id, self.config.inter_stage_delay, cancel)
            .await?;
        Ok(Dispatch::Completed(report))
    }

    /// Looks up a job accepted by an earlier queued dispatch.
    pub async fn job_status(&self, handle: &JobHandle) -> StagecoachResult<JobStatus> {
        self.queue.status(handle).await
    }
}
