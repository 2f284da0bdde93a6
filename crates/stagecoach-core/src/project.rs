use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{StagecoachError, StagecoachResult};

/// One of the six fixed phases a project passes through.
///
/// Wraps the raw stage number so an out-of-range value can never enter the
/// system; deserialization goes through the same validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stage(u8);

impl Stage {
    /// The first stage, idea intake.
    pub const FIRST: Stage = Stage(1);
    /// The final stage, optimization. Nothing follows it.
    pub const FINAL: Stage = Stage(6);

    /// Validates and wraps a raw stage number.
    pub fn new(stage: u8) -> StagecoachResult<Self> {
        if (1..=6).contains(&stage) {
            Ok(Self(stage))
        } else {
            Err(StagecoachError::InvalidStage(stage))
        }
    }

    /// The raw stage number, guaranteed to be in `1..=6`.
    pub fn get(self) -> u8 {
        self.0
    }

    /// The stage after this one, or `None` at the final stage.
    pub fn next(self) -> Option<Stage> {
        if self.0 < Self::FINAL.0 {
            Some(Stage(self.0 + 1))
        } else {
            None
        }
    }

    /// This stage and every stage after it, in pipeline order.
    pub fn through_final(self) -> impl Iterator<Item = Stage> {
        (self.0..=Self::FINAL.0).map(Stage)
    }

    /// The project status reached by entering this stage.
    ///
    /// Stage 1 returns `None`: entering it keeps the project's current
    /// status (a freshly created project stays at `idea`).
    pub fn project_status(self) -> Option<ProjectStatus> {
        match self.0 {
            2 => Some(ProjectStatus::Validating),
            3 => Some(ProjectStatus::Developing),
            4 => Some(ProjectStatus::Marketing),
            5 => Some(ProjectStatus::Operating),
            6 => Some(ProjectStatus::Scaling),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Stage {
    type Error = StagecoachError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Stage::new(value)
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> u8 {
        stage.0
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a project, derived from its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// Freshly created, stage 1 not yet left.
    Idea,
    /// Stage 2 reached.
    Validating,
    /// Stage 3 reached.
    Developing,
    /// Stage 4 reached.
    Marketing,
    /// Stage 5 reached.
    Operating,
    /// Stage 6 reached.
    Scaling,
    /// Reserved terminal state; never set by the orchestrator itself.
    Completed,
    /// Reserved terminal state; never set by the orchestrator itself.
    Failed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Idea => write!(f, "idea"),
            ProjectStatus::Validating => write!(f, "validating"),
            ProjectStatus::Developing => write!(f, "developing"),
            ProjectStatus::Marketing => write!(f, "marketing"),
            ProjectStatus::Operating => write!(f, "operating"),
            ProjectStatus::Scaling => write!(f, "scaling"),
            ProjectStatus::Completed => write!(f, "completed"),
            ProjectStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A user's venture walking through the six-stage pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: Uuid,
    /// The user that owns this project.
    pub owner_id: Uuid,
    /// Short display name.
    pub name: String,
    /// The idea text fed to every agent as the working prompt.
    pub idea: String,
    /// Current pipeline stage. Monotonically non-decreasing.
    pub stage: Stage,
    /// Status derived from `stage` via [`Stage::project_status`].
    pub status: ProjectStatus,
    /// Share of this project's tasks that are completed, in `0.0..=100.0`.
    /// Recomputed from the task table, never set directly.
    pub completion_percentage: f64,
    /// UTC timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// UTC timestamp of the last orchestrator mutation.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Creates a project at stage 1 with status `idea` and zero progress.
    pub fn new(owner_id: Uuid, name: impl Into<String>, idea: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            idea: idea.into(),
            stage: Stage::FIRST,
            status: ProjectStatus::Idea,
            completion_percentage: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records that `stage` has been run: moves `stage` forward if it is
    /// ahead of the current one (never backwards) and rederives `status`.
    pub fn enter_stage(&mut self, stage: Stage) {
        if stage > self.stage {
            self.stage = stage;
        }
        if let Some(status) = self.stage.project_status() {
            self.status = status;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_bounds() {
        assert!(Stage::new(0).is_err());
        assert!(Stage::new(7).is_err());
        for n in 1..=6 {
            assert_eq!(Stage::new(n).unwrap().get(), n);
        }
    }

    #[test]
    fn test_stage_next() {
        assert_eq!(Stage::FIRST.next(), Some(Stage::new(2).unwrap()));
        assert_eq!(Stage::FINAL.next(), None);
    }

    #[test]
    fn test_stage_through_final() {
        let stages: Vec<u8> = Stage::new(4).unwrap().through_final().map(Stage::get).collect();
        assert_eq!(stages, vec![4, 5, 6]);
    }

    #[test]
    fn test_stage_status_map() {
        assert_eq!(Stage::FIRST.project_status(), None);
        assert_eq!(Stage::new(2).unwrap().project_status(), Some(ProjectStatus::Validating));
        assert_eq!(Stage::new(3).unwrap().project_status(), Some(ProjectStatus::Developing));
        assert_eq!(Stage::new(4).unwrap().project_status(), Some(ProjectStatus::Marketing));
        assert_eq!(Stage::new(5).unwrap().project_status(), Some(ProjectStatus::Operating));
        assert_eq!(Stage::FINAL.project_status(), Some(ProjectStatus::Scaling));
    }

    #[test]
    fn test_stage_rejects_invalid_on_deserialize() {
        assert!(serde_json::from_str::<Stage>("3").is_ok());
        assert!(serde_json::from_str::<Stage>("9").is_err());
    }

    #[test]
    fn test_project_new_defaults() {
        let project = Project::new(Uuid::new_v4(), "AI notes", "note-taking for lawyers");
        assert_eq!(project.stage, Stage::FIRST);
        assert_eq!(project.status, ProjectStatus::Idea);
        assert_eq!(project.completion_percentage, 0.0);
    }

    #[test]
    fn test_enter_stage_is_monotonic() {
        let mut project = Project::new(Uuid::new_v4(), "p", "i");
        project.enter_stage(Stage::new(3).unwrap());
        assert_eq!(project.stage.get(), 3);
        assert_eq!(project.status, ProjectStatus::Developing);

        // Replaying an earlier stage never moves the project backwards.
        project.enter_stage(Stage::new(2).unwrap());
        assert_eq!(project.stage.get(), 3);
        assert_eq!(project.status, ProjectStatus::Developing);
    }

    #[test]
    fn test_enter_stage_one_keeps_idea() {
        let mut project = Project::new(Uuid::new_v4(), "p", "i");
        project.enter_stage(Stage::FIRST);
        assert_eq!(project.status, ProjectStatus::Idea);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ProjectStatus::Validating).unwrap();
        assert_eq!(json, "\"validating\"");
        assert_eq!(ProjectStatus::Validating.to_string(), "validating");
    }
}
