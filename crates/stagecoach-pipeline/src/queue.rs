//! Optional background job dispatch with a synchronous fallback.
//!
//! A [`JobQueue`] may be unreachable; `try_submit` says so by returning
//! `None` and the controller falls back to running in its own context.
//! The probe happens once per top-level call, never per task, so a
//! stage is either fully queued or fully synchronous.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stagecoach_core::{Stage, StagecoachError, StagecoachResult};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::runner::StageRunner;

/// Work item accepted by a job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSpec {
    /// Run a single stage for a project.
    RunStage {
        /// Project to run.
        project_id: Uuid,
        /// Stage to run.
        stage: Stage,
    },
    /// Walk every remaining stage of a project.
    AutoRun {
        /// Project to walk.
        project_id: Uuid,
    },
}

/// Handle returned when a job is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Queue-assigned job id.
    pub id: Uuid,
}

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, not yet picked up.
    Queued,
    /// A worker is on it.
    Running,
    /// Finished; `result` holds the serialized report.
    Succeeded,
    /// Aborted; `error` says why.
    Failed,
}

/// Point-in-time view of a submitted job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    /// Where the job is in its lifecycle.
    pub state: JobState,
    /// Serialized [`StageReport`](crate::runner::StageReport) or
    /// [`AutoRunReport`](crate::runner::AutoRunReport) once succeeded.
    pub result: Option<serde_json::Value>,
    /// Failure reason once failed.
    pub error: Option<String>,
}

/// A queue that may or may not be reachable.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Offers a job. `None` means the queue cannot take work right now
    /// and the caller should execute synchronously instead.
    async fn try_submit(&self, spec: JobSpec) -> Option<JobHandle>;

    /// Looks up a previously submitted job.
    async fn status(&self, handle: &JobHandle) -> StagecoachResult<JobStatus>;
}

/// The always-unreachable queue. Every call runs synchronously.
pub struct NoQueue;

#[async_trait]
impl JobQueue for NoQueue {
    async fn try_submit(&self, _spec: JobSpec) -> Option<JobHandle> {
        None
    }

    async fn status(&self, handle: &JobHandle) -> StagecoachResult<JobStatus> {
        Err(StagecoachError::Queue(format!("Unknown job: {}", handle.id)))
    }
}

/// In-process queue backed by a single worker task.
///
/// Jobs run one at a time in submission order, which also serializes
/// concurrent callers onto the single local inference endpoint.
///
/// Job statuses are retained for the life of the process so finished
/// jobs stay pollable; callers submitting unbounded job counts should
/// run a longer-lived broker instead.
pub struct LocalQueue {
    tx: mpsc::Sender<(Uuid, JobSpec)>,
    jobs: Arc<RwLock<HashMap<Uuid, JobStatus>>>,
    cancel: CancellationToken,
}

impl LocalQueue {
    /// Spawns the worker and returns the queue.
    pub fn start(runner: Arc<StageRunner>, inter_stage_delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let jobs = Arc::new(RwLock::new(HashMap::new()));
        let cancel = CancellationToken::new();

        tokio::spawn(worker_loop(
            runner,
            inter_stage_delay,
            rx,
            jobs.clone(),
            cancel.clone(),
        ));

        Self { tx, jobs, cancel }
    }

    /// Stops the worker, interrupting an in-flight job at its next
    /// cancellation point.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl JobQueue for LocalQueue {
    async fn try_submit(&self, spec: JobSpec) -> Option<JobHandle> {
        let id = Uuid::new_v4();

        // Recorded before sending so a status probe right after submit
        // always finds the job.
        self.jobs.write().await.insert(
            id,
            JobStatus {
                state: JobState::Queued,
                result: None,
                error: None,
            },
        );

        if self.tx.send((id, spec)).await.is_err() {
            // Worker gone. Behave like an unreachable broker.
            self.jobs.write().await.remove(&id);
            return None;
        }
        Some(JobHandle { id })
    }

    async fn status(&self, handle: &JobHandle) -> StagecoachResult<JobStatus> {
        self.jobs
            .read()
            .await
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| StagecoachError::Queue(format!("Unknown job: {}", handle.id)))
    }
}

async fn worker_loop(
    runner: Arc<StageRunner>,
    inter_stage_delay: Duration,
    mut rx: mpsc::Receiver<(Uuid, JobSpec)>,
    jobs: Arc<RwLock<HashMap<Uuid, JobStatus>>>,
    cancel: CancellationToken,
) {
    loop {
        let (id, spec) = tokio::select! {
            received = rx.recv() => match received {
                Some(job) => job,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        if let Some(status) = jobs.write().await.get_mut(&id) {
            status.state = JobState::Running;
        }
        info!(job = %id, "job started");

        let outcome = match spec {
            JobSpec::RunStage { project_id, stage } => runner
                .run_stage(project_id, stage, &cancel)
                .await
                .and_then(|report| serde_json::to_value(report).map_err(StagecoachError::from)),
            JobSpec::AutoRun { project_id } => runner
                .auto_run(project_id, inter_stage_delay, &cancel)
                .await
                .and_then(|report| serde_json::to_value(report).map_err(StagecoachError::from)),
        };

        if let Some(status) = jobs.write().await.get_mut(&id) {
            match outcome {
                Ok(value) => {
                    info!(job = %id, "job succeeded");
                    status.state = JobState::Succeeded;
                    status.result = Some(value);
                }
                Err(e) => {
                    error!(job = %id, error = %e, "job failed");
                    status.state = JobState::Failed;
                    status.error = Some(e.to_string());
                }
            }
        }
    }
}
