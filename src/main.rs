use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use uatu_sweeper::persistence::StateStore;
use uatu_sweeper::utils::{logging::init_logging, metrics::install_exporter};
use uatu_sweeper::web::{self, AppState};
use uatu_sweeper::{
    AppConfig, ChromeNavigator, PriceExtractor, QueueEvent, QueueScheduler, QueueSettings, RunOptions, RunPhase,
    SchedulerHandle, SqliteStateStore,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP control API
    Serve,

    /// Price every query in a file, one per line
    Run {
        #[arg(short, long)]
        items: PathBuf,

        #[arg(short, long)]
        engine: Option<String>,

        /// Base delay between tasks in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Search for the bare query instead of the quoted phrase
        #[arg(long)]
        no_quotes: bool,

        /// Maximum number of queries taken from the file (0 = all)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Write the final status JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Continue the persisted run
    Resume {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the persisted run record
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_path(path),
        None => AppConfig::from_env(),
    }
    .context("Failed to load configuration")?;

    let _log_guard = init_logging(&config.logging, cli.verbose)?;
    info!("Starting Uatu Sweeper v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Run {
            items,
            engine,
            delay_ms,
            no_quotes,
            limit,
            output,
        } => {
            let items = read_items(&items)?;
            let options = RunOptions {
                engine,
                delay_ms,
                use_quotes: no_quotes.then_some(false),
                limit_count: limit,
                ..RunOptions::default()
            };
            run(config, items, options, output).await
        }
        Commands::Resume { output } => resume(config, output).await,
        Commands::Status => status(config).await,
    }
}

fn read_items(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

async fn open_store(config: &AppConfig) -> Result<Arc<SqliteStateStore>> {
    let store = SqliteStateStore::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open {}", config.database.url))?;
    Ok(Arc::new(store))
}

async fn start_scheduler(config: &AppConfig) -> Result<(SchedulerHandle, JoinHandle<()>)> {
    install_exporter(&config.metrics)?;

    let store = open_store(config).await?;
    let extractor = Arc::new(PriceExtractor::new(config.extraction.clone())?);
    let scraper_config = config.scraper.clone();
    let navigator = tokio::task::spawn_blocking(move || ChromeNavigator::launch(scraper_config, extractor))
        .await?
        .context("Failed to start the browser")?;

    let scheduler = QueueScheduler::new(
        config.run.clone(),
        QueueSettings::from_config(config),
        Arc::new(navigator),
        store,
    );
    Ok(scheduler.spawn().await)
}

async fn serve(config: AppConfig) -> Result<()> {
    let (handle, join) = start_scheduler(&config).await?;
    let state = AppState {
        scheduler: handle.clone(),
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down...");
    };
    web::serve(&config.server, state, shutdown).await?;

    handle.pause().await?;
    handle.shutdown().await?;
    join.await?;
    Ok(())
}

async fn run(config: AppConfig, items: Vec<String>, options: RunOptions, output: Option<PathBuf>) -> Result<()> {
    if items.is_empty() {
        bail!("No queries to run");
    }
    let (handle, join) = start_scheduler(&config).await?;

    // Subscribe first so the early events of a short run are not missed.
    let events = handle.subscribe();
    let phase = handle.start(items, options).await?;
    info!("Queue {} ({} tasks)", phase, handle.status().total);

    follow(&handle, events).await?;
    finish(handle, join, output).await
}

async fn resume(config: AppConfig, output: Option<PathBuf>) -> Result<()> {
    let (handle, join) = start_scheduler(&config).await?;
    let events = handle.subscribe();

    let phase = handle.resume().await?;
    if phase != RunPhase::Running {
        warn!("Nothing to resume (run is {})", phase);
    } else {
        follow(&handle, events).await?;
    }
    finish(handle, join, output).await
}

async fn status(config: AppConfig) -> Result<()> {
    let store = open_store(&config).await?;
    match store.restore().await? {
        Some(state) => println!("{}", serde_json::to_string_pretty(&state.status())?),
        None => println!("No persisted run"),
    }
    Ok(())
}

/// Logs progress until the run completes, stops, or pauses on a challenge
/// page. Ctrl-C pauses the run.
async fn follow(handle: &SchedulerHandle, mut events: tokio::sync::broadcast::Receiver<QueueEvent>) -> Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let phase = handle.pause().await?;
                warn!("Interrupted, run is {}; continue with `resume`", phase);
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(QueueEvent::Progress { cursor, total, task, result }) => match result {
                    Some(result) => info!(
                        "[{}/{}] {}: {} {}..{} avg {}",
                        cursor, total, task, result.currency, result.min, result.max, result.avg
                    ),
                    None => info!("[{}/{}] {}: no price", cursor, total, task),
                },
                Ok(QueueEvent::Done) => return Ok(()),
                Ok(QueueEvent::AnomalyDetected { task, .. }) => {
                    warn!("Challenge page while searching '{}'; solve it, then run `resume`", task);
                    return Ok(());
                }
                Ok(QueueEvent::StateChanged { phase: RunPhase::Stopped }) => return Ok(()),
                Ok(QueueEvent::StateChanged { .. }) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} queue events", skipped),
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}

async fn finish(handle: SchedulerHandle, join: JoinHandle<()>, output: Option<PathBuf>) -> Result<()> {
    let report = serde_json::to_string_pretty(&handle.status())?;
    match output {
        Some(path) => {
            std::fs::write(&path, report).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Results written to {}", path.display());
        }
        None => println!("{}", report),
    }

    handle.shutdown().await?;
    join.await?;
    Ok(())
}
