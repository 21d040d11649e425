use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use concord::api::{serve, AppState};
use concord::definitions::{default_fleet, FleetDefinition, TaskBatch};
use concord::factory::AgentFactory;
use concord::lifecycle::AgentLifecycleManager;
use concord::locks::FileLockTable;
use concord::registry::AgentRegistry;
use concord::storage::{open_history_store, LocalFileStore, Workspace};
use concord::types::{HistoryFilter, ResolutionStrategy};
use concord::{Config, Orchestrator};

#[derive(Parser)]
#[command(name = "concord")]
#[command(about = "Agent pool coordination with file locking and conflict resolution", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent fleet and the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        /// Fleet definition YAML; the built-in fleet is used when omitted
        #[arg(short, long)]
        fleet: Option<PathBuf>,
    },
    /// Run a batch of tasks against the fleet and print the reports
    Run {
        #[arg(help = "Task batch YAML")]
        tasks: PathBuf,
        #[arg(short, long)]
        fleet: Option<PathBuf>,
    },
    /// Query the conflict resolution history
    History {
        #[arg(long)]
        agent: Vec<String>,
        #[arg(long)]
        file: Vec<String>,
        #[arg(long)]
        strategy: Vec<String>,
        /// Print aggregate statistics instead of entries
        #[arg(long)]
        stats: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env(),
    };

    match cli.command {
        Commands::Serve { port, fleet } => run_server(config, port, fleet.as_deref()).await?,
        Commands::Run { tasks, fleet } => run_batch(config, &tasks, fleet.as_deref()).await?,
        Commands::History {
            agent,
            file,
            strategy,
            stats,
        } => show_history(config, agent, file, strategy, stats).await?,
    }

    Ok(())
}

async fn bootstrap(config: &Config, fleet: Option<&Path>) -> Result<Arc<Orchestrator>> {
    let registry = Arc::new(AgentRegistry::new());
    let lifecycle = Arc::new(AgentLifecycleManager::new(
        registry,
        AgentFactory::with_worker_defaults(config.worker.clone()),
        config.lifecycle.clone(),
    ));

    let specs = match fleet {
        Some(path) => FleetDefinition::load(path)?.agents,
        None => default_fleet(),
    };
    let outcome = lifecycle.create_agents(specs).await;
    for failure in &outcome.failed {
        log::warn!("Agent {} failed to start: {}", failure.id, failure.error);
    }
    log::info!("{} agents running", outcome.succeeded.len());

    let history = open_history_store(&config.history)
        .await
        .context("Failed to open conflict history")?;
    let workspace = Arc::new(Workspace::new(Arc::new(LocalFileStore::new(
        config.workspace_root.clone(),
    ))));
    let locks = Arc::new(FileLockTable::new(config.locks.clone()));

    Ok(Arc::new(Orchestrator::new(lifecycle, workspace, history, locks)))
}

async fn run_server(config: Config, port: Option<u16>, fleet: Option<&Path>) -> Result<()> {
    let orchestrator = bootstrap(&config, fleet).await?;
    let monitor = orchestrator.lifecycle().spawn_health_monitor();

    let served = serve(
        AppState {
            orchestrator: orchestrator.clone(),
        },
        port.unwrap_or(config.api_port),
    )
    .await;

    monitor.abort();
    orchestrator.lifecycle().shutdown_all().await;
    served
}

async fn run_batch(config: Config, tasks: &Path, fleet: Option<&Path>) -> Result<()> {
    let batch = TaskBatch::load(tasks)?;
    let orchestrator = bootstrap(&config, fleet).await?;

    let mut tickets = Vec::new();
    for task in batch.tasks {
        let task_id = task.id.clone();
        match orchestrator.dispatch(task).await {
            Ok(ticket) => tickets.push(ticket),
            Err(e) => println!("Task {} not dispatched: {}", task_id, e),
        }
    }

    for ticket in tickets {
        let report = ticket.wait().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let open = orchestrator.active_conflicts();
    if !open.is_empty() {
        println!("\n{} unresolved conflict(s):", open.len());
        for view in &open {
            println!("  {} {}", view.conflict.id, view.conflict.description);
        }
    }

    orchestrator.lifecycle().shutdown_all().await;
    Ok(())
}

async fn show_history(
    config: Config,
    agents: Vec<String>,
    files: Vec<String>,
    strategies: Vec<String>,
    stats: bool,
) -> Result<()> {
    let store = open_history_store(&config.history).await?;

    if stats {
        let entries = store.list(&HistoryFilter::default()).await?;
        let stats = concord::conflict::HistoryStats::from_entries(&entries);
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let filter = HistoryFilter {
        agent_ids: agents,
        file_patterns: files,
        strategies: strategies
            .iter()
            .map(|s| s.parse::<ResolutionStrategy>())
            .collect::<std::result::Result<Vec<_>, _>>()?,
        ..Default::default()
    };

    for entry in store.list(&filter).await? {
        println!(
            "{}  {:<12} {:<24} {} ({} ms)",
            entry.resolution.resolved_at.to_rfc3339(),
            entry.resolution.strategy.as_str(),
            entry.resolution.resolved_by,
            entry.conflict.file_path,
            entry.time_to_resolve_ms
        );
    }
    Ok(())
}
