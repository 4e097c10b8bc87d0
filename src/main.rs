//! `aegisd` CLI entry point, grounded in the teacher's `main.rs` dispatch
//! shape: parse args, load config, wire adapters into services, hand off to
//! the per-subcommand handler.

use std::sync::Arc;

use aegis::adapters::console::ConsoleCommunicationService;
use aegis::adapters::llm::NullLlmService;
use aegis::adapters::sqlite::initialize_database;
use aegis::cli::commands::{schedule, task};
use aegis::cli::{Cli, Commands, ScheduleCommands, TaskCommands};
use aegis::domain::models::AgentState;
use aegis::domain::ports::{AuditSink, CommunicationService, LlmService, PersistenceStore, TracingAuditSink};
use aegis::infrastructure::config::{AegisConfig, ConfigLoader};
use aegis::infrastructure::logging::LoggerImpl;
use aegis::services::context_builder::{ChannelDefaults, ContextBuilder};
use aegis::services::dispatcher::{ActionDispatcher, ActionHandler};
use aegis::services::dma_orchestrator::DmaOrchestrator;
use aegis::services::guardrails::{GuardrailPipeline, GuardrailsConfig};
use aegis::services::handlers::{
    DeferHandler, ForgetHandler, MemorizeHandler, ObserveHandler, PonderHandler, RecallHandler,
    RejectHandler, SpeakHandler, TaskCompleteHandler, ToolHandler,
};
use aegis::services::pipeline::ThoughtProcessor;
use aegis::services::processors::runtime::{Processor, ProcessorRuntime};
use aegis::services::processors::shutdown::{ShutdownContext, ShutdownProcessor};
use aegis::services::processors::wakeup::{WakeupMode, WakeupProcessor, WakeupStep};
use aegis::services::processors::work::WorkProcessor;
use aegis::services::scheduler::TaskScheduler;
use anyhow::{Context, Result};
use clap::Parser;

/// DMA retry/timeout policy (spec.md §6 `run_dma_with_retries`). Not yet a
/// named config key; fixed here until a deployment needs to tune it.
const DMA_RETRY_LIMIT: u32 = 3;
const DMA_TIMEOUT_SECONDS: u64 = 30;

/// Fallback channel used by SPEAK when neither the action parameters nor
/// the dispatch context name one (spec.md §4.4 "a configured 'snore'
/// channel").
const SNORE_CHANNEL: &str = "snore";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            ConfigLoader::load_from_file(path).with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => ConfigLoader::load().context("failed to load configuration")?,
    };

    let _logger_guard = LoggerImpl::init(&config.logging).context("failed to initialize logging")?;

    let database_url = format!("sqlite:{}", config.database.path);
    let pool = initialize_database(&database_url)
        .await
        .context("failed to initialize database")?;
    let persistence: Arc<dyn PersistenceStore> = Arc::new(aegis::adapters::sqlite::SqliteStore::new(pool));

    match cli.command {
        Commands::Task(task_cmd) => {
            match task_cmd {
                TaskCommands::List { status } => task::handle_list(&persistence, status, cli.json).await?,
                TaskCommands::Show { id } => task::handle_show(&persistence, id, cli.json).await?,
            }
            return Ok(());
        }
        Commands::Schedule(schedule_cmd) => {
            let scheduler = TaskScheduler::new(persistence.clone(), config.scheduler.check_interval_seconds);
            match schedule_cmd {
                ScheduleCommands::Add {
                    name,
                    goal,
                    prompt,
                    origin_thought_id,
                    at,
                    cron,
                } => schedule::handle_add(&scheduler, name, goal, prompt, origin_thought_id, at, cron, cli.json).await?,
                ScheduleCommands::List => schedule::handle_list(&persistence, cli.json).await?,
                ScheduleCommands::Cancel { id } => schedule::handle_cancel(&scheduler, id, cli.json).await?,
            }
            return Ok(());
        }
        Commands::Run => {}
    }

    run_agent(persistence, config).await
}

/// Wires every adapter and service into a `ProcessorRuntime` and the
/// scheduler's cooperative loop, then drives both until a stop signal
/// arrives (spec.md §4.2, §4.5, §5 "Cancellation & shutdown").
async fn run_agent(persistence: Arc<dyn PersistenceStore>, config: AegisConfig) -> Result<()> {
    let profile = config.selected_profile().context("no agent profile selected")?.clone();

    let llm: Arc<dyn LlmService> = Arc::new(NullLlmService::new());
    let comms: Arc<dyn CommunicationService> = Arc::new(ConsoleCommunicationService::new());
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

    let context_builder = ContextBuilder::new(
        persistence.clone(),
        ChannelDefaults {
            env_default: std::env::var("DISCORD_CHANNEL_ID").ok(),
            config_default: Some(SNORE_CHANNEL.to_string()),
        },
        None,
    );
    let dma_orchestrator = DmaOrchestrator::new(llm.clone(), DMA_RETRY_LIMIT, DMA_TIMEOUT_SECONDS);
    let guardrails = GuardrailPipeline::new(&GuardrailsConfig::from(&config.guardrails));

    let pipeline = Arc::new(ThoughtProcessor::new(
        persistence.clone(),
        llm.clone(),
        None,
        context_builder,
        dma_orchestrator,
        guardrails,
        profile,
        config.workflow.max_ponder_rounds,
        DMA_RETRY_LIMIT,
        DMA_TIMEOUT_SECONDS,
    ));

    let defer_handler = Arc::new(DeferHandler::new(persistence.clone(), Some(comms.clone()), None));
    let ponder_handler = Arc::new(PonderHandler::new(
        persistence.clone(),
        defer_handler.clone(),
        config.workflow.max_ponder_rounds,
    ));
    let handlers: Vec<Arc<dyn ActionHandler>> = vec![
        Arc::new(SpeakHandler::new(comms.clone(), persistence.clone(), SNORE_CHANNEL)),
        defer_handler,
        ponder_handler,
        Arc::new(RejectHandler::new(persistence.clone(), None)),
        Arc::new(ObserveHandler::new(persistence.clone())),
        Arc::new(MemorizeHandler::new(persistence.clone(), None)),
        Arc::new(RecallHandler::new(persistence.clone(), None)),
        Arc::new(ForgetHandler::new(persistence.clone(), None)),
        Arc::new(ToolHandler::new(persistence.clone(), None)),
        Arc::new(TaskCompleteHandler::new(persistence.clone())),
    ];
    let dispatcher = Arc::new(ActionDispatcher::new(handlers, persistence.clone(), audit)?);

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);

    let wakeup_processor: Arc<dyn Processor> = Arc::new(WakeupProcessor::new(
        persistence.clone(),
        pipeline.clone(),
        dispatcher.clone(),
        WakeupStep::default_sequence("aegis", "autonomous agent"),
        WakeupMode::Blocking,
        config.workflow.max_ponder_rounds,
    ));
    let work_processor: Arc<dyn Processor> = Arc::new(WorkProcessor::new(
        persistence.clone(),
        pipeline.clone(),
        dispatcher.clone(),
        config.workflow.max_active_tasks,
        config.workflow.max_active_thoughts,
    ));
    let shutdown_processor: Arc<dyn Processor> = Arc::new(ShutdownProcessor::new(
        persistence.clone(),
        pipeline.clone(),
        dispatcher.clone(),
        ShutdownContext {
            reason: "operator requested shutdown".to_string(),
            initiated_by: "operator".to_string(),
            allow_deferral: true,
            expected_reactivation: None,
            is_terminal: true,
        },
    ));

    let runtime = ProcessorRuntime::new(
        vec![wakeup_processor, work_processor, shutdown_processor],
        AgentState::Wakeup,
        config.workflow.round_delay_seconds,
        stop_rx.clone(),
    );

    let scheduler = TaskScheduler::new(persistence.clone(), config.scheduler.check_interval_seconds);
    let scheduler_stop = stop_rx.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_stop).await });
    let runtime_task = tokio::spawn(async move {
        let mut runtime = runtime;
        runtime.run().await
    });

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("stop signal received; waiting for the round loop to finish");
    let _ = stop_tx.send(true);

    let grace = std::time::Duration::from_secs(10);
    match tokio::time::timeout(grace, runtime_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => return Err(e.into()),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => tracing::warn!("round loop did not stop within the grace period; exiting anyway"),
    }
    scheduler_task.abort();
    Ok(())
}
