//! Progress events emitted while a stage run is in flight.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A progress notification produced during stage processing.
///
/// Emission is best-effort. A sink that drops events never fails the
/// operation that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A task is about to be handed to the executor.
    TaskProcessing {
        /// Project the task belongs to.
        project_id: Uuid,
        /// Task being handed over.
        task_id: Uuid,
        /// Name of the agent bound to the task.
        agent: String,
        /// Stage the task belongs to.
        stage: u8,
    },
    /// A task finished successfully.
    TaskCompleted {
        /// Project the task belongs to.
        project_id: Uuid,
        /// Task that completed.
        task_id: Uuid,
        /// Name of the agent bound to the task.
        agent: String,
        /// Stage the task belongs to.
        stage: u8,
    },
    /// A task failed. `error` is already truncated for storage.
    TaskFailed {
        /// Project the task belongs to.
        project_id: Uuid,
        /// Task that failed.
        task_id: Uuid,
        /// Name of the agent bound to the task.
        agent: String,
        /// Stage the task belongs to.
        stage: u8,
        /// Failure reason.
        error: String,
    },
    /// A stage run is starting.
    StageAdvancing {
        /// Project being advanced.
        project_id: Uuid,
        /// Stage the project currently holds.
        from: u8,
        /// Stage about to run.
        to: u8,
    },
}

impl PipelineEvent {
    /// The project this event concerns.
    pub fn project_id(&self) -> Uuid {
        match self {
            Self::TaskProcessing { project_id, .. }
            | Self::TaskCompleted { project_id, .. }
            | Self::TaskFailed { project_id, .. }
            | Self::StageAdvancing { project_id, .. } => *project_id,
        }
    }

    /// Routing key for subscribers that filter by project.
    pub fn routing_key(&self) -> String {
        format!("project:{}", self.project_id())
    }
}

/// Receives progress events, fire-and-forget.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event. Implementations swallow their own failures.
    async fn emit(&self, event: PipelineEvent);
}

/// Discards every event.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: PipelineEvent) {}
}

/// Fans events out over a tokio broadcast channel.
pub struct BroadcastSink {
    tx: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl BroadcastSink {
    /// Creates a sink holding at most `capacity` undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to the event feed.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn emit(&self, event: PipelineEvent) {
        // A send error just means nobody is listening.
        let _ = self.tx.send(event);
    }
}
