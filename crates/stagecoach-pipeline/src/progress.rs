//! Completion percentage derived from the task table.

use std::sync::Arc;

use chrono::Utc;
use stagecoach_core::{StagecoachError, StagecoachResult, TaskStatus};
use stagecoach_store::{ProjectStore, TaskStore};
use tracing::debug;
use uuid::Uuid;

/// Recomputes a project's completion percentage from its tasks.
pub struct ProgressTracker {
    projects: Arc<dyn ProjectStore>,
    tasks: Arc<dyn TaskStore>,
}

impl ProgressTracker {
    /// Creates a tracker over the given stores.
    pub fn new(projects: Arc<dyn ProjectStore>, tasks: Arc<dyn TaskStore>) -> Self {
        Self { projects, tasks }
    }

    /// Recounts tasks and writes the percentage back to the project.
    ///
    /// The percentage is `100 * completed / total` rounded to two
    /// decimal places, or 0 when the project has no tasks yet.
    /// Idempotent and safe to call redundantly.
    pub async fn recompute(&self, project_id: Uuid) -> StagecoachResult<f64> {
        let tasks = self.tasks.tasks_for(project_id, None, None).await?;

        let percentage = if tasks.is_empty() {
            0.0
        } else {
            let completed = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .count();
            round2(100.0 * completed as f64 / tasks.len() as f64)
        };

        let mut project = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or(StagecoachError::ProjectNotFound(project_id))?;
        project.completion_percentage = percentage;
        project.updated_at = Utc::now();
        self.projects.update_project(&project).await?;

        debug!(project = %project_id, percentage, "progress recomputed");
        Ok(percentage)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
