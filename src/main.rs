//! Baton-Crawl main entry point
//!
//! This is the command-line interface for the Baton-Crawl crawl driver.

use baton_crawl::config::{load_config_with_hash, Config};
use baton_crawl::crawler::{CycleMode, Orchestrator, RunOutcome};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Baton-Crawl: a continuation-aware crawl driver
///
/// Baton-Crawl claims bounded batches of paths from a persistent frontier,
/// fans them out to concurrent workers and hands the crawl over to a fresh
/// run whenever the current one has claimed more URLs than its budget.
#[derive(Parser, Debug)]
#[command(name = "baton-crawl")]
#[command(version = "1.0.0")]
#[command(about = "A continuation-aware crawl driver", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Continue an existing crawl instead of starting a new one
    #[arg(long, value_name = "ID")]
    crawl_id: Option<String>,

    /// Mark runs left open by a dead process as interrupted before continuing
    #[arg(long, requires = "crawl_id")]
    takeover: bool,

    /// Stop after the first run, even if it hands over to a continuation
    #[arg(long)]
    single_run: bool,

    /// Validate config and show the effective limits without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics for a crawl and exit
    #[arg(long, requires = "crawl_id", conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.single_run {
        config.limits.single_run = true;
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        if let Some(crawl_id) = &cli.crawl_id {
            handle_stats(&config, crawl_id)?;
        }
    } else {
        handle_crawl(config, config_hash, cli.crawl_id, cli.takeover).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("baton_crawl=info,warn"),
            1 => EnvFilter::new("baton_crawl=debug,info"),
            2 => EnvFilter::new("baton_crawl=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Baton-Crawl Dry Run ===\n");

    println!("Crawl:");
    println!("  Base URL: {}", config.crawl.base_url);
    if config.crawl.start_paths.is_empty() {
        println!("  Start paths: (base URL path)");
    } else {
        println!("  Start paths: {}", config.crawl.start_paths.join(", "));
    }
    if !config.crawl.path_keywords.is_empty() {
        println!("  Path keywords: {}", config.crawl.path_keywords.join(", "));
    }

    println!("\nLimits (after environment overrides):");
    println!("  Run URL threshold: {}", config.limits.run_url_threshold);
    println!(
        "  Parallel URLs per cycle: {}",
        config.limits.parallel_urls_to_sync
    );
    println!(
        "  Max concurrent workers: {}",
        config.limits.max_concurrent_workers
    );
    println!("  Cycle retries: {}", config.limits.cycle_retries);
    println!("  Single run: {}", config.limits.single_run);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Staging directory: {}", config.output.staging_dir);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics for one crawl
fn handle_stats(config: &Config, crawl_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    use baton_crawl::output::{load_statistics, print_statistics};
    use baton_crawl::storage::SqliteStorage;
    use std::path::Path;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage, crawl_id)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    crawl_id: Option<String>,
    takeover: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = Orchestrator::new(config, config_hash)?;

    let (ctx, mode) = match crawl_id {
        Some(id) => {
            if takeover {
                orchestrator.takeover(&id)?;
            }
            (orchestrator.resume(&id)?, CycleMode::ContinuationStart)
        }
        None => (orchestrator.start_crawl()?, CycleMode::Initializing),
    };

    match orchestrator.drive(&ctx, mode).await {
        Ok(outcomes) => {
            let continued = outcomes
                .iter()
                .filter(|o| matches!(o, RunOutcome::Continued { .. }))
                .count();
            match outcomes.last() {
                Some(RunOutcome::Completed { .. }) => tracing::info!(
                    "Crawl {} completed after {} run(s)",
                    ctx.crawl_id,
                    outcomes.len()
                ),
                _ => tracing::info!(
                    "Crawl {} paused after {} continuation(s); resume with --crawl-id {}",
                    ctx.crawl_id,
                    continued,
                    ctx.crawl_id
                ),
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl {} failed: {}", ctx.crawl_id, e);
            Err(e.into())
        }
    }
}
