//! Statistics for a crawl
//!
//! Collects the progress counters, the frontier breakdown and the run chain
//! of one crawl and renders them for the `--stats` flag.

use crate::state::{ProgressEntry, UrlState};
use crate::storage::{FrontierStore, ProgressTracker, RunLedger, RunRecord, RunStatus};
use crate::BatonError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub crawl_id: String,
    pub base_url: String,

    /// Counters as of the last committed cycle
    pub progress: Option<ProgressEntry>,

    /// Frontier paths by state (states with no paths are omitted)
    pub paths_by_state: HashMap<UrlState, u64>,

    /// Every run of the crawl, oldest first
    pub runs: Vec<RunRecord>,
}

impl CrawlStatistics {
    /// Paths known to the frontier in any state
    pub fn known_paths(&self) -> u64 {
        self.paths_by_state.values().sum()
    }

    pub fn count(&self, state: UrlState) -> u64 {
        self.paths_by_state.get(&state).copied().unwrap_or(0)
    }

    /// Number of runs that handed over to a continuation
    pub fn continuations(&self) -> usize {
        self.runs
            .iter()
            .filter(|run| run.status == RunStatus::Continued)
            .count()
    }
}

/// Loads statistics for one crawl
pub fn load_statistics<S>(storage: &S, crawl_id: &str) -> Result<CrawlStatistics, BatonError>
where
    S: FrontierStore + ProgressTracker + RunLedger + ?Sized,
{
    let ctx = storage.get_crawl(crawl_id)?;
    let progress = storage.get_progress(crawl_id)?;

    let mut paths_by_state = HashMap::new();
    for state in UrlState::all_states() {
        let count = storage.count_by_state(&ctx.frontier_store_address, state)?;
        if count > 0 {
            paths_by_state.insert(state, count);
        }
    }

    let runs = storage.list_runs(crawl_id)?;

    Ok(CrawlStatistics {
        crawl_id: ctx.crawl_id,
        base_url: ctx.base_url,
        progress,
        paths_by_state,
        runs,
    })
}

/// Duration of a finished run in seconds
pub fn run_duration_seconds(run: &RunRecord) -> Option<i64> {
    let started = run.started_at.parse::<DateTime<Utc>>().ok()?;
    let finished = run.finished_at.as_ref()?.parse::<DateTime<Utc>>().ok()?;
    Some((finished - started).num_seconds())
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl {} ===\n", stats.crawl_id);
    println!("Base URL: {}", stats.base_url);
    println!();

    println!("Progress:");
    match &stats.progress {
        Some(progress) => {
            println!("  URLs claimed (total): {}", progress.total_url_count);
            println!("  URLs claimed (current run): {}", progress.run_url_count);
            println!("  Cycles: {}", progress.cycle);
        }
        None => println!("  (no progress recorded)"),
    }
    println!();

    println!("Frontier ({} known paths):", stats.known_paths());
    let mut counts: Vec<_> = stats.paths_by_state.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1));
    for (state, count) in counts {
        println!("  {}: {}", state, count);
    }
    println!();

    println!(
        "Runs ({}, {} continuation(s)):",
        stats.runs.len(),
        stats.continuations()
    );
    for run in &stats.runs {
        let duration = run_duration_seconds(run)
            .map(|s| format!("{}s", s))
            .unwrap_or_else(|| "-".to_string());
        let chained = run
            .continued_from
            .map(|id| format!(" (after run {})", id))
            .unwrap_or_default();
        println!(
            "  #{} {} {} {}{}",
            run.id,
            run.status.to_db_string(),
            run.started_at,
            duration,
            chained
        );
    }
}
