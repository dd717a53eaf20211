//! Review-Sweep main entry point
//!
//! This is the command-line interface for the Review-Sweep review crawler.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use review_sweep::config::{load_config_with_hash, Config};
use review_sweep::crawler::{
    BatchOptions, BatchOutcome, HttpLoader, QueueEntry, QueueManager, RunOutcome, SessionRunner,
    StartRequest,
};
use review_sweep::output::{
    load_statistics, print_statistics, ObserverSet, SqliteSink, TracingObserver,
};
use review_sweep::storage::open_store;
use review_sweep::{parse_target_url, SweepError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Review-Sweep: a resumable review crawler
///
/// Review-Sweep walks the paginated review listings of configured sites, one target at a
/// time. Progress is persisted after every page, so an interrupted crawl resumes where it
/// stopped and never stores the same review twice.
#[derive(Parser, Debug)]
#[command(name = "review-sweep")]
#[command(version = "1.0.0")]
#[command(about = "A resumable review crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a target URL to the queue
    Enqueue {
        url: String,

        /// Label shown in the queue listing
        #[arg(long)]
        title: Option<String>,

        /// Site profile to use instead of resolving it from the domain
        #[arg(long)]
        source: Option<String>,
    },

    /// List queued targets
    Queue,

    /// Remove a target from the queue
    Remove { url: String },

    /// Empty the queue
    Clear,

    /// Crawl every queued target in order
    Run {
        /// Only collect reviews newer than the watermark
        #[arg(long)]
        incremental: bool,

        /// Watermark date (YYYY-MM-DD); defaults to each target's last sync
        #[arg(long, value_name = "DATE", requires = "incremental")]
        since: Option<NaiveDate>,

        /// Name recorded on every session of the batch
        #[arg(long)]
        name: Option<String>,
    },

    /// Crawl a single target now
    Crawl {
        url: String,

        #[arg(long)]
        source: Option<String>,

        /// Only collect reviews newer than the watermark
        #[arg(long)]
        incremental: bool,

        /// Watermark date (YYYY-MM-DD); defaults to the target's last sync
        #[arg(long, value_name = "DATE", requires = "incremental")]
        since: Option<NaiveDate>,

        /// Stop a session that is still running instead of refusing to start
        #[arg(long)]
        force: bool,
    },

    /// Continue a session that was interrupted
    Resume,

    /// Stop the running session
    Stop,

    /// Show the session, the queue and stored review counts
    Status,

    /// Validate the configuration and print it
    Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Check => handle_check(&config),
        Command::Status => handle_status(&config),
        Command::Enqueue { url, title, source } => {
            let queue = QueueManager::new(build_runner(config)?);
            let mut entry = QueueEntry::new(url);
            entry.title = title;
            entry.source = source;
            match queue.enqueue(entry) {
                Ok(len) => println!("✓ Queued ({} in queue)", len),
                Err(SweepError::DuplicateEnqueue { url }) => println!("Already queued: {}", url),
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        Command::Queue => {
            let queue = QueueManager::new(build_runner(config)?);
            let entries = queue.list()?;
            println!("Queue ({}):", entries.len());
            for (position, entry) in entries.iter().enumerate() {
                let title = entry.title.as_deref().unwrap_or("");
                println!("  {}. {} {}", position + 1, entry.url, title);
            }
            Ok(())
        }
        Command::Remove { url } => {
            let queue = QueueManager::new(build_runner(config)?);
            if queue.remove(&url)? {
                println!("✓ Removed {}", url);
            } else {
                println!("Not queued: {}", url);
            }
            Ok(())
        }
        Command::Clear => {
            let queue = QueueManager::new(build_runner(config)?);
            println!("✓ Cleared {} queued targets", queue.clear()?);
            Ok(())
        }
        Command::Run {
            incremental,
            since,
            name,
        } => {
            let options = BatchOptions {
                incremental_only: incremental,
                watermark_date: since,
                queue_name: name,
            };
            handle_batch(config, options).await
        }
        Command::Crawl {
            url,
            source,
            incremental,
            since,
            force,
        } => {
            let mut request = StartRequest::new(parse_target_url(&url)?);
            request.source = source;
            request.incremental_only = incremental;
            request.watermark_date = since;
            request.force = force;
            handle_crawl(config, request).await
        }
        Command::Resume => handle_resume(config).await,
        Command::Stop => {
            let runner = build_runner(config)?;
            if runner.context().stop_session(None)? {
                println!("✓ Session stopped");
            } else {
                println!("No running session");
            }
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("review_sweep=info,warn"),
            1 => EnvFilter::new("review_sweep=debug,info"),
            2 => EnvFilter::new("review_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Wires the HTTP loader, the SQLite store and sink, and the tracing observer together
fn build_runner(config: Config) -> Result<Arc<SessionRunner>, Box<dyn std::error::Error>> {
    let database = Path::new(&config.storage.database_path);
    let store = open_store(database)?;
    let sink = SqliteSink::new(database)?;
    let loader = HttpLoader::from_config(&config.user_agent, &config.crawler)?;
    let observers = ObserverSet::new().with(Arc::new(TracingObserver));

    Ok(Arc::new(SessionRunner::new(
        Arc::new(config),
        store,
        Arc::new(loader),
        Arc::new(sink),
        observers,
    )))
}

/// Stops the running session when Ctrl-C is pressed
fn stop_on_interrupt(runner: Arc<SessionRunner>, queue: Option<Arc<QueueManager>>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, stopping");

        let stopped = match &queue {
            Some(queue) => queue.stop_batch(),
            None => runner.context().stop_session(None),
        };
        if let Err(e) = stopped {
            tracing::error!("Failed to stop session: {}", e);
        }
    });
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Rejected(reason) => println!("✗ Not started: {}", reason),
        RunOutcome::Finished {
            status,
            collected,
            note,
        } => {
            println!("Session {}: {} reviews collected", status, collected);
            if let Some(note) = note {
                println!("  {}", note);
            }
        }
    }
}

/// Handles the check command: validates config and prints the site profiles
fn handle_check(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Review-Sweep Configuration ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Delay between pages: {}-{}ms",
        config.crawler.min_delay_ms, config.crawler.max_delay_ms
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!("  Max pages per session: {}", config.crawler.max_pages);
    println!(
        "  Rate limit retries: {} (backoff {}-{}ms)",
        config.crawler.rate_limit_retries,
        config.crawler.backoff_base_ms,
        config.crawler.backoff_max_ms
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nSites ({}):", config.sites.len());
    for site in &config.sites {
        println!("  - {} [{}] {}", site.name, site.mode, site.domain);
        println!("    Listing: {}", site.listing_url);
        println!("    Reviews: {}", site.selectors.review);
        if !site.challenge_markers.is_empty() {
            println!("    Challenge markers: {}", site.challenge_markers.join(", "));
        }
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the status command: shows the session, queue and review counts
fn handle_status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let database = Path::new(&config.storage.database_path);
    println!("Database: {}\n", database.display());

    let store = open_store(database)?;
    let sink = SqliteSink::new(database)?;
    let stats = load_statistics(&store, &sink)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the run command: crawls the queue
async fn handle_batch(
    config: Config,
    options: BatchOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let runner = build_runner(config)?;
    let queue = Arc::new(QueueManager::new(runner.clone()));
    stop_on_interrupt(runner, Some(queue.clone()));

    match queue.start_batch(options).await? {
        BatchOutcome::Rejected(reason) => println!("✗ Batch not started: {}", reason),
        BatchOutcome::Finished(report) => {
            println!("=== Batch Report ===\n");
            for target in &report.targets {
                let status = target
                    .status
                    .map_or_else(|| "skipped".to_string(), |s| s.to_string());
                println!(
                    "  {} [{}] {} reviews",
                    target.target_id.as_deref().unwrap_or(&target.url),
                    status,
                    target.collected
                );
                if let Some(note) = &target.note {
                    println!("    {}", note);
                }
            }
            println!("\nTotal: {} reviews", report.collected());
            if report.stopped {
                println!("Batch stopped; remaining targets are still queued");
            }
        }
    }

    Ok(())
}

/// Handles the crawl command: runs a single session
async fn handle_crawl(
    config: Config,
    request: StartRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let runner = build_runner(config)?;
    stop_on_interrupt(runner.clone(), None);

    match runner.run(request).await {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles the resume command: continues an interrupted session
async fn handle_resume(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let runner = build_runner(config)?;
    stop_on_interrupt(runner.clone(), None);

    match runner.resume().await? {
        Some(outcome) => print_outcome(&outcome),
        None => println!("No interrupted session to resume"),
    }

    Ok(())
}
