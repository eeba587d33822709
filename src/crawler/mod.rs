//! Crawler module: the cycle core and everything around it
//!
//! - `controller`: one frontier cycle (claim, count, stage, decide)
//! - `orchestrator`: sequences cycles into runs and chains continuation runs
//! - `worker`, `fetcher`, `parser`: visiting a staged path

mod controller;
mod fetcher;
mod orchestrator;
mod parser;
mod worker;

pub use controller::{ContinuationController, CycleDecision, CycleError, CycleLimits, CycleMode};
pub use fetcher::{build_http_client, fetch_url, fetch_with_retries, FetchResult};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use parser::{parse_html, ParsedPage};
pub use worker::{visit, SharedStorage, VisitOutcome};

use crate::config::Config;
use crate::Result;

/// Starts a new crawl from `config` and drives it to completion (or to the
/// first split when `single-run` is set)
pub async fn crawl(config: Config, config_hash: &str) -> Result<Vec<RunOutcome>> {
    let orchestrator = Orchestrator::new(config, config_hash)?;
    let ctx = orchestrator.start_crawl()?;
    orchestrator.drive(&ctx, CycleMode::Initializing).await
}
