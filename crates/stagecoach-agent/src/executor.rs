//! Runs a single agent call end to end and keeps the books straight.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use stagecoach_core::{
    Agent, AgentExecution, AgentStatus, ExecutionResult, StagecoachError, StagecoachResult,
};
use stagecoach_store::{AgentStore, ExecutionStore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{CompletionBackend, CompletionRequest};

/// Executes agents against a completion backend.
///
/// Every call flips the agent to `running`, performs the round-trip,
/// records an [`AgentExecution`], folds the outcome into the agent's
/// running success rate, and returns the agent to `idle`.
pub struct AgentExecutor {
    backend: Arc<dyn CompletionBackend>,
    agents: Arc<dyn AgentStore>,
    executions: Arc<dyn ExecutionStore>,
}

impl AgentExecutor {
    /// Creates an executor over the given backend and stores.
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        agents: Arc<dyn AgentStore>,
        executions: Arc<dyn ExecutionStore>,
    ) -> Self {
        Self {
            backend,
            agents,
            executions,
        }
    }

    /// Runs `prompt` against the agent and records the outcome.
    ///
    /// A backend failure is not an `Err`: it comes back as an
    /// [`ExecutionResult`] with `success == false`, the error message
    /// captured, and an execution record on file. Only a missing agent
    /// or a failing store surfaces as `Err`, in which case the agent is
    /// left flagged with [`AgentStatus::Error`].
    pub async fn execute(
        &self,
        agent_id: Uuid,
        prompt: &str,
        project_id: Option<Uuid>,
        task_id: Option<Uuid>,
    ) -> StagecoachResult<ExecutionResult> {
        let mut agent = self
            .agents
            .get_agent(agent_id)
            .await?
            .ok_or(StagecoachError::AgentNotFound(agent_id))?;

        agent.status = AgentStatus::Running;
        self.agents.update_agent(&agent).await?;

        match self
            .record_round_trip(&agent, prompt, project_id, task_id)
            .await
        {
            Ok(result) => {
                agent.record_outcome(result.success);
                agent.status = AgentStatus::Idle;
                self.agents.update_agent(&agent).await?;
                info!(
                    agent = %agent.name,
                    success = result.success,
                    tokens = result.tokens_used,
                    "agent execution finished"
                );
                Ok(result)
            }
            Err(e) => {
                agent.status = AgentStatus::Error;
                if let Err(update_err) = self.agents.update_agent(&agent).await {
                    warn!(
                        agent = %agent.name,
                        error = %update_err,
                        "could not flag agent after failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn record_round_trip(
        &self,
        agent: &Agent,
        prompt: &str,
        project_id: Option<Uuid>,
        task_id: Option<Uuid>,
    ) -> StagecoachResult<ExecutionResult> {
        let request = CompletionRequest::for_agent(agent, prompt);
        let started = Instant::now();
        let call = self.backend.complete(&request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (success, response, tokens_used, cost, error, metadata) = match call {
            Ok(completion) => (
                true,
                completion.content,
                completion.tokens_used,
                completion.cost,
                None,
                completion.metadata,
            ),
            Err(e) => (
                false,
                String::new(),
                0,
                0.0,
                Some(e.to_string()),
                serde_json::Value::Null,
            ),
        };

        // The record is inserted before the duration lands so a failed
        // backfill still leaves the call on file.
        let execution = AgentExecution {
            id: Uuid::new_v4(),
            agent_id: agent.id,
            project_id,
            task_id,
            prompt: prompt.to_string(),
            response: response.clone(),
            tokens_used,
            cost,
            duration_ms: 0,
            success,
            error: error.clone(),
            metadata: metadata.clone(),
            created_at: Utc::now(),
        };
        self.executions.insert_execution(&execution).await?;
        self.executions
            .backfill_duration(execution.id, duration_ms)
            .await?;

        Ok(ExecutionResult {
            success,
            response,
            tokens_used,
            cost,
            error,
            execution_id: execution.id,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Completion;
    use async_trait::async_trait;
    use stagecoach_core::Stage;
    use stagecoach_store::{ExecutionStats, MemoryStore};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FixedBackend {
        content: &'static str,
        calls: AtomicU32,
    }

    impl FixedBackend {
        fn new(content: &'static str) -> Self {
            Self {
                content,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for FixedBackend {
        async fn complete(&self, request: &CompletionRequest) -> StagecoachResult<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion {
                content: self.content.to_string(),
                tokens_used: 42,
                cost: 0.0,
                metadata: serde_json::json!({"model": request.model}),
            })
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl CompletionBackend for FailingBackend {
        async fn complete(&self, _request: &CompletionRequest) -> StagecoachResult<Completion> {
            Err(StagecoachError::Provider("Connection error".to_string()))
        }
    }

    struct CaptureBackend {
        seen: Mutex<Option<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionBackend for CaptureBackend {
        async fn complete(&self, request: &CompletionRequest) -> StagecoachResult<Completion> {
            *self.seen.lock().unwrap() = Some(request.clone());
            Ok(Completion {
                content: "ok".to_string(),
                tokens_used: 1,
                cost: 0.0,
                metadata: serde_json::Value::Null,
            })
        }
    }

    struct FailingExecutions;

    #[async_trait]
    impl ExecutionStore for FailingExecutions {
        async fn insert_execution(&self, _execution: &AgentExecution) -> StagecoachResult<()> {
            Err(StagecoachError::Store("injected failure".to_string()))
        }

        async fn get_execution(&self, _id: Uuid) -> StagecoachResult<Option<AgentExecution>> {
            Ok(None)
        }

        async fn backfill_duration(&self, _id: Uuid, _duration_ms: u64) -> StagecoachResult<()> {
            Ok(())
        }

        async fn executions_for_project(
            &self,
            _project_id: Uuid,
        ) -> StagecoachResult<Vec<AgentExecution>> {
            Ok(Vec::new())
        }

        async fn stats(&self) -> StagecoachResult<ExecutionStats> {
            Ok(ExecutionStats::default())
        }
    }

    async fn seeded_agent(store: &MemoryStore) -> Agent {
        let agent = Agent::new(
            "Idea Processor",
            Stage::new(1).unwrap(),
            "Processes and structures initial project ideas",
        );
        store.insert_agent(&agent).await.unwrap();
        agent
    }

    #[tokio::test]
    async fn test_execute_success_records_everything() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(FixedBackend::new("all good"));
        let executor = AgentExecutor::new(backend.clone(), store.clone(), store.clone());
        let agent = seeded_agent(&store).await;
        let project_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();

        let result = executor
            .execute(agent.id, "analyze this idea", Some(project_id), Some(task_id))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.response, "all good");
        assert_eq!(result.tokens_used, 42);
        assert!(result.error.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let execution = store
            .get_execution(result.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert!(execution.success);
        assert_eq!(execution.prompt, "analyze this idea");
        assert_eq!(execution.project_id, Some(project_id));
        assert_eq!(execution.task_id, Some(task_id));

        let agent = store.get_agent(agent.id).await.unwrap().unwrap();
        assert_eq!(agent.total_executions, 1);
        assert_eq!(agent.success_rate, 100.0);
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.last_active.is_some());
    }

    #[tokio::test]
    async fn test_execute_backend_failure_is_captured() {
        let store = Arc::new(MemoryStore::new());
        let executor =
            AgentExecutor::new(Arc::new(FailingBackend), store.clone(), store.clone());
        let agent = seeded_agent(&store).await;

        let result = executor.execute(agent.id, "hello", None, None).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.response, "");
        assert!(result.error.as_deref().unwrap().contains("Connection error"));

        let execution = store
            .get_execution(result.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!execution.success);
        assert!(execution.error.is_some());

        let agent = store.get_agent(agent.id).await.unwrap().unwrap();
        assert_eq!(agent.total_executions, 1);
        assert_eq!(agent.success_rate, 0.0);
        assert_eq!(agent.status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_execute_unknown_agent() {
        let store = Arc::new(MemoryStore::new());
        let executor = AgentExecutor::new(
            Arc::new(FixedBackend::new("unused")),
            store.clone(),
            store,
        );

        let err = executor
            .execute(Uuid::new_v4(), "hello", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StagecoachError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_execute_store_failure_flags_agent() {
        let store = Arc::new(MemoryStore::new());
        let executor = AgentExecutor::new(
            Arc::new(FixedBackend::new("never stored")),
            store.clone(),
            Arc::new(FailingExecutions),
        );
        let agent = seeded_agent(&store).await;

        let err = executor.execute(agent.id, "hello", None, None).await.unwrap_err();
        assert!(matches!(err, StagecoachError::Store(_)));

        let agent = store.get_agent(agent.id).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Error);
        assert_eq!(agent.total_executions, 0);
    }

    #[tokio::test]
    async fn test_execute_builds_request_from_agent() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(CaptureBackend {
            seen: Mutex::new(None),
        });
        let executor = AgentExecutor::new(backend.clone(), store.clone(), store.clone());
        let agent = seeded_agent(&store).await;

        executor.execute(agent.id, "size the market", None, None).await.unwrap();

        let seen = backend.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.model, agent.model);
        assert_eq!(seen.prompt, "size the market");
        assert_eq!(seen.system_prompt.as_deref(), Some(agent.system_prompt.as_str()));
        assert_eq!(seen.temperature, agent.temperature);
        assert_eq!(seen.max_tokens, agent.max_tokens);
    }
}
