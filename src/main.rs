//! Reading-Ledger main entry point
//!
//! This is the command-line interface for mirroring a user's book reviews.

use anyhow::{bail, Context};
use clap::Parser;
use reading_ledger::config::{load_config_with_hash, Config};
use reading_ledger::crawler::{CrawlReport, Crawler, ProgressObserver};
use reading_ledger::output::{get_summary, print_summary};
use reading_ledger::storage::{DateRange, SqliteStorage};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Reading-Ledger: an incremental mirror of a book-review history
///
/// Reading-Ledger pages through a user's review listing with an existing
/// session token and keeps every entry in a local SQLite database. Re-running
/// it only writes what changed on the remote site.
#[derive(Parser, Debug)]
#[command(name = "reading-ledger")]
#[command(version)]
#[command(about = "Incremental mirror of a book-review history", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Account whose listing is mirrored
    #[arg(short, long, value_name = "ID")]
    user: String,

    /// Session token (for example the Cookie header of a logged-in browser)
    #[arg(long, env = "LEDGER_AUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Stop after this many listing pages
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show the stored summary for the user and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Earliest review date included in --stats (YYYY-MM-DD)
    #[arg(long, requires = "stats")]
    from: Option<String>,

    /// Latest review date included in --stats (YYYY-MM-DD)
    #[arg(long, requires = "stats")]
    to: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &cli)
    } else if cli.stats {
        handle_stats(&config, &cli)
    } else {
        handle_crawl(config, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("reading_ledger=info,warn"),
            1 => EnvFilter::new("reading_ledger=debug,info"),
            2 => EnvFilter::new("reading_ledger=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the crawl plan
fn handle_dry_run(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    reading_ledger::crawler::validate_user_id(&cli.user)?;

    println!("=== Reading-Ledger Dry Run ===\n");

    println!("Session:");
    println!("  Site: {}", config.session.base_url);
    println!("  Auth header: {}", config.session.auth_header);
    println!(
        "  Token: {}",
        if cli.token.is_some() { "provided" } else { "missing" }
    );
    println!("  Timeout: {}s", config.session.timeout_secs);

    println!("\nCrawler:");
    println!(
        "  Listing: {}",
        config.crawler.listing_path.replace("{user}", &cli.user)
    );
    println!("  Page size: {}", config.crawler.page_size);
    println!("  Retries per page: {}", config.crawler.max_retries);
    println!("  Failed pages before abort: {}", config.crawler.failure_threshold);
    match cli.max_pages.or(config.crawler.max_pages) {
        Some(n) => println!("  Page ceiling: {}", n),
        None => println!("  Page ceiling: none"),
    }

    println!("\nRate limit:");
    println!("  Delay: {}ms", config.rate_limit.request_delay_ms);
    println!("  Max backoff: {}ms", config.rate_limit.max_delay_ms);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows the stored summary
fn handle_stats(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let range = DateRange::parse(cli.from.as_deref(), cli.to.as_deref())?;
    let path = Path::new(&config.output.database_path);
    let storage = SqliteStorage::open_reader(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    let summary = get_summary(&storage, &cli.user, range)?;
    print_summary(&cli.user, &summary);

    Ok(())
}

/// Prints each progress event on its own line
struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn on_progress(
        &mut self,
        pages_done: u32,
        inserted: u64,
        updated: u64,
        unchanged: u64,
        status_message: &str,
    ) {
        println!(
            "[{:>3} pages | +{} ~{} ={}] {}",
            pages_done, inserted, updated, unchanged, status_message
        );
    }

    fn on_finished(&mut self, report: &CrawlReport) {
        println!(
            "\nCrawl {}: {} pages ({} skipped), {} records ({} new, {} updated)",
            report.outcome,
            report.pages_done,
            report.pages_skipped,
            report.committed,
            report.tally.inserted,
            report.tally.updated
        );
        if let Some(detail) = &report.detail {
            println!("  Cause: {}", detail);
        }
    }
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, cli: &Cli) -> anyhow::Result<()> {
    let Some(token) = cli.token.as_deref() else {
        bail!("A session token is required (--token or LEDGER_AUTH_TOKEN)");
    };

    let crawler = Crawler::open(config).context("Failed to open database")?;
    let handle = crawler.start_crawl(&cli.user, token, cli.max_pages)?;

    // Ctrl-C asks the worker to stop at the next page boundary
    let stopper = handle.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the current page");
            stopper.request_stop();
        }
    });

    let report = handle.observe(&mut ConsoleProgress).await?;

    if report.outcome.is_success() {
        Ok(())
    } else {
        bail!("Crawl {}", report.outcome)
    }
}
