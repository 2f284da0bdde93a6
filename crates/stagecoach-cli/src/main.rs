use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use stagecoach_agent::{AgentExecutor, OllamaBackend};
use stagecoach_core::{Project, Stage};
use stagecoach_pipeline::{
    AutoRunReport, BroadcastSink, Dispatch, JobHandle, JobQueue, JobState, JobStatus, LocalQueue,
    NoQueue, PipelineConfig, PipelineController, PipelineEvent, StageReport, StageRunEntry,
    StageRunner,
};
use stagecoach_store::{AgentStore, ExecutionStore, MemoryStore, ProjectStore, TaskStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "stagecoach", about = "Stagecoach — staged agent pipeline over local models")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "stagecoach.toml")]
    config: PathBuf,

    /// Skip the job queue and run in the calling context
    #[arg(long)]
    sync_only: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project from an idea and run its first stage
    Run {
        /// Idea text handed to every agent as the working prompt
        #[arg(long)]
        idea: String,
        /// Project name (defaults to the leading words of the idea)
        #[arg(long)]
        name: Option<String>,
    },
    /// Create a project and walk it through all six stages
    Auto {
        /// Idea text handed to every agent as the working prompt
        #[arg(long)]
        idea: String,
        /// Project name (defaults to the leading words of the idea)
        #[arg(long)]
        name: Option<String>,
    },
    /// List the agent catalog by stage
    Agents,
}

#[derive(Deserialize, Default)]
struct StagecoachConfig {
    #[serde(default)]
    provider: ProviderConfig,
    #[serde(default)]
    pipeline: PipelineSection,
}

#[derive(Deserialize)]
struct ProviderConfig {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Deserialize)]
struct PipelineSection {
    #[serde(default = "default_inter_stage_delay_secs")]
    inter_stage_delay_secs: u64,
    #[serde(default = "default_stale_after_secs")]
    stale_after_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            inter_stage_delay_secs: default_inter_stage_delay_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

fn default_base_url() -> String {
    stagecoach_agent::ollama::DEFAULT_BASE_URL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    stagecoach_agent::ollama::REQUEST_TIMEOUT.as_secs()
}
fn default_inter_stage_delay_secs() -> u64 {
    PipelineConfig::default().inter_stage_delay.as_secs()
}
fn default_stale_after_secs() -> u64 {
    PipelineConfig::default().stale_after.as_secs()
}

/// Everything a pipeline command needs, wired once.
struct Stack {
    store: Arc<MemoryStore>,
    events: Arc<BroadcastSink>,
    controller: PipelineController,
    local_queue: Option<Arc<LocalQueue>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Run { idea, name } => {
            let stack = build_stack(&config, cli.sync_only)?;
            let cancel = interrupt_token(stack.local_queue.clone());
            let project = create_project(&stack.store, name, idea).await?;
            spawn_event_printer(&stack.events);

            let dispatch = stack
                .controller
                .run_stage(project.id, project.stage, &cancel)
                .await?;
            let report: StageReport = resolve(dispatch, &stack.controller, &cancel).await?;
            print_stage_report(&report);
            print_summary(&stack.store, project.id).await?;
        }
        Commands::Auto { idea, name } => {
            let stack = build_stack(&config, cli.sync_only)?;
            let cancel = interrupt_token(stack.local_queue.clone());
            let project = create_project(&stack.store, name, idea).await?;
            spawn_event_printer(&stack.events);

            let dispatch = stack.controller.auto_run(project.id, &cancel).await?;
            let report: AutoRunReport = resolve(dispatch, &stack.controller, &cancel).await?;
            print_auto_report(&report);
            print_summary(&stack.store, project.id).await?;
        }
        Commands::Agents => {
            let store = MemoryStore::seeded();
            print_catalog(&store).await?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Reads the TOML config, falling back to defaults when the file does
/// not exist. A present but malformed file is an error.
async fn load_config(path: &Path) -> anyhow::Result<StagecoachConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(toml::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StagecoachConfig::default()),
        Err(e) => Err(anyhow::anyhow!(
            "Failed to read config file '{}': {e}",
            path.display()
        )),
    }
}

fn build_stack(config: &StagecoachConfig, sync_only: bool) -> anyhow::Result<Stack> {
    let store = Arc::new(MemoryStore::seeded());
    let backend = OllamaBackend::with_timeout(
        config.provider.base_url.as_str(),
        Duration::from_secs(config.provider.request_timeout_secs),
    )?;
    let events = Arc::new(BroadcastSink::new(256));

    let pipeline = PipelineConfig {
        inter_stage_delay: Duration::from_secs(config.pipeline.inter_stage_delay_secs),
        stale_after: Duration::from_secs(config.pipeline.stale_after_secs),
    };

    let executor = Arc::new(AgentExecutor::new(
        Arc::new(backend),
        store.clone(),
        store.clone(),
    ));
    let runner = Arc::new(StageRunner::new(
        store.clone(),
        store.clone(),
        store.clone(),
        executor,
        events.clone(),
        pipeline.stale_after,
    ));

    let local_queue = if sync_only {
        None
    } else {
        Some(Arc::new(LocalQueue::start(
            runner.clone(),
            pipeline.inter_stage_delay,
        )))
    };
    let queue: Arc<dyn JobQueue> = match &local_queue {
        Some(queue) => queue.clone(),
        None => Arc::new(NoQueue),
    };

    let controller = PipelineController::new(store.clone(), runner, queue, pipeline);
    Ok(Stack {
        store,
        events,
        controller,
        local_queue,
    })
}

/// Cancels the returned token on Ctrl-C and shuts the local queue down
/// with it, so an in-flight job stops at its next cancellation point.
fn interrupt_token(queue: Option<Arc<LocalQueue>>) -> CancellationToken {
    let cancel = CancellationToken::new();
    let watched = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current task");
            watched.cancel();
            if let Some(queue) = queue {
                queue.shutdown();
            }
        }
    });
    cancel
}

async fn create_project(
    store: &Arc<MemoryStore>,
    name: Option<String>,
    idea: String,
) -> anyhow::Result<Project> {
    let name = name.unwrap_or_else(|| derive_name(&idea));
    let project = Project::new(Uuid::new_v4(), name, idea);
    store.insert_project(&project).await?;
    // Stage-one tasks exist from the moment the project does.
    store
        .ensure_tasks_for_stage(project.id, project.stage)
        .await?;
    info!(project = %project.id, name = %project.name, "project created");
    Ok(project)
}

fn derive_name(idea: &str) -> String {
    let words: Vec<&str> = idea.split_whitespace().take(5).collect();
    if words.is_empty() {
        "untitled".to_string()
    } else {
        words.join(" ")
    }
}

fn spawn_event_printer(events: &BroadcastSink) {
    let mut feed = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = feed.recv().await {
            println!("{}", describe(&event));
        }
    });
}

fn describe(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::StageAdvancing { from, to, .. } => {
            format!("== running stage {to} (project at stage {from})")
        }
        PipelineEvent::TaskProcessing { agent, stage, .. } => {
            format!("   stage {stage} | {agent}: processing")
        }
        PipelineEvent::TaskCompleted { agent, stage, .. } => {
            format!("   stage {stage} | {agent}: completed")
        }
        PipelineEvent::TaskFailed { agent, stage, error, .. } => {
            format!("   stage {stage} | {agent}: failed ({error})")
        }
    }
}

/// Unwraps a dispatch: a synchronous result is returned as-is, a queued
/// one is polled to completion and its report deserialized.
async fn resolve<T: serde::de::DeserializeOwned>(
    dispatch: Dispatch<T>,
    controller: &PipelineController,
    cancel: &CancellationToken,
) -> anyhow::Result<T> {
    match dispatch {
        Dispatch::Completed(value) => Ok(value),
        Dispatch::Queued(handle) => {
            let status = wait_for_job(controller, &handle, cancel).await?;
            decode_result(status)
        }
    }
}

async fn wait_for_job(
    controller: &PipelineController,
    handle: &JobHandle,
    cancel: &CancellationToken,
) -> anyhow::Result<JobStatus> {
    info!(job = %handle.id, "waiting for queued job");
    loop {
        let status = controller.job_status(handle).await?;
        match status.state {
            JobState::Succeeded | JobState::Failed => return Ok(status),
            // A cancelled worker never picks the job up; a running one
            // finishes with a partial result worth waiting for.
            JobState::Queued if cancel.is_cancelled() => {
                anyhow::bail!("interrupted before the job started")
            }
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

fn decode_result<T: serde::de::DeserializeOwned>(status: JobStatus) -> anyhow::Result<T> {
    match status.state {
        JobState::Succeeded => {
            let value = status
                .result
                .ok_or_else(|| anyhow::anyhow!("job succeeded without a result"))?;
            Ok(serde_json::from_value(value)?)
        }
        JobState::Failed => anyhow::bail!(
            "job failed: {}",
            status.error.unwrap_or_else(|| "unknown error".to_string())
        ),
        state => anyhow::bail!("job did not finish (state {state:?})"),
    }
}

fn print_stage_report(report: &StageReport) {
    println!(
        "\nStage {} finished with {} task(s)",
        report.stage, report.agents_triggered
    );
    for outcome in &report.outcomes {
        match &outcome.error {
            Some(error) => println!("  {} — {} ({error})", outcome.agent, outcome.status),
            None => println!("  {} — {}", outcome.agent, outcome.status),
        }
    }
}

fn print_auto_report(report: &AutoRunReport) {
    if report.partial {
        println!("\nAuto-run interrupted at stage {}", report.final_stage);
    } else {
        println!("\nAuto-run finished at stage {}", report.final_stage);
    }
    for entry in &report.stages {
        match entry {
            StageRunEntry::Completed { stage, report } => {
                println!(
                    "  stage {stage}: completed, {} task(s)",
                    report.agents_triggered
                );
            }
            StageRunEntry::Failed { stage, error } => {
                println!("  stage {stage}: failed ({error})");
            }
        }
    }
}

async fn print_summary(store: &Arc<MemoryStore>, project_id: Uuid) -> anyhow::Result<()> {
    let project = store
        .get_project(project_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Project not found: {project_id}"))?;
    let stats = store.stats().await?;

    println!(
        "\nProject '{}': stage {} ({}), {:.1}% complete",
        project.name, project.stage, project.status, project.completion_percentage
    );
    println!(
        "Executions: {} total, {:.1}% success, {} tokens, ${:.4}, avg {:.0} ms",
        stats.total_executions,
        stats.success_rate,
        stats.total_tokens,
        stats.total_cost,
        stats.avg_duration_ms
    );
    Ok(())
}

async fn print_catalog(store: &MemoryStore) -> anyhow::Result<()> {
    for stage in Stage::FIRST.through_final() {
        let agents = store.agents_for_stage(stage).await?;
        println!("Stage {stage}:");
        for agent in &agents {
            println!("  {} — {}", agent.name, agent.description);
            if !agent.capabilities.is_empty() {
                println!("    capabilities: {}", agent.capabilities.join(", "));
            }
        }
    }

    let total = store.list_agents().await?.len();
    println!("\nTotal: {total} agent(s)");
    Ok(())
}
