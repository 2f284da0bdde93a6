//! Stage orchestration for stagecoach.
//!
//! One place creates tasks, runs agents, and moves projects forward:
//! [`StageRunner`]. [`PipelineController`] wraps it with three thin
//! entry points and decides, once per call, whether work goes to a job
//! queue or runs in the calling context.

pub mod controller;
pub mod events;
pub mod progress;
pub mod queue;
pub mod runner;

pub use controller::{Dispatch, PipelineConfig, PipelineController};
pub use events::{BroadcastSink, EventSink, NullSink, PipelineEvent};
pub use progress::ProgressTracker;
pub use queue::{JobHandle, JobQueue, JobSpec, JobState, JobStatus, LocalQueue, NoQueue};
pub use runner::{AgentOutcome, AutoRunReport, StageReport, StageRunEntry, StageRunner};
