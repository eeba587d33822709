//! Orchestrator - sequences cycles into runs and runs into a crawl
//!
//! A run is a chain of cycles under one entry in the run ledger. After every
//! cycle the staged batch is handed to workers and awaited; only then does
//! the orchestrator act on the cycle's decision:
//!
//! - threshold exceeded: the run ends as `Continued` and, unless the crawl is
//!   configured for a single run, a continuation run is chained
//! - nothing claimed: the run ends as `Completed`
//! - otherwise: next cycle
//!
//! Delivering the batch before splitting means no claimed path is dropped at
//! a run boundary. A continuation run first re-delivers any path an earlier
//! run counted but never finished.

use crate::config::Config;
use crate::crawler::build_http_client;
use crate::crawler::controller::{
    ContinuationController, CycleDecision, CycleError, CycleLimits, CycleMode,
};
use crate::crawler::worker::{visit, SharedStorage, VisitOutcome};
use crate::staging::{BatchStaging, FsBatchStaging, StagedBatch, StagingLocation};
use crate::state::{cycle_of_claim_key, CrawlContext, ProgressEntry};
use crate::storage::{
    FrontierStore, ProgressTracker, RunLedger, RunStatus, SqliteStorage, StorageError,
};
use crate::url::{base_path, resolve_path, to_crawl_path};
use crate::BatonError;
use reqwest::Client;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Delay before the first retry; doubled for every further attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The frontier is exhausted
    Completed { run_id: i64 },

    /// The run used up its budget; the crawl goes on in a continuation run
    Continued { run_id: i64 },
}

impl RunOutcome {
    pub fn run_id(&self) -> i64 {
        match self {
            Self::Completed { run_id } | Self::Continued { run_id } => *run_id,
        }
    }
}

/// Worker results for one fanned-out batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FanOutSummary {
    visited: usize,
    failed: usize,
    discovered: usize,
}

/// In-process orchestration engine
pub struct Orchestrator {
    config: Arc<Config>,
    config_hash: String,
    storage: SharedStorage,
    staging: Arc<FsBatchStaging>,
    client: Client,
}

impl Orchestrator {
    /// Opens the database and staging directory named in the config
    pub fn new(config: Config, config_hash: impl Into<String>) -> Result<Self, BatonError> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let staging = FsBatchStaging::new(&config.output.staging_dir)?;
        Self::with_parts(config, config_hash, storage, staging)
    }

    /// Builds an orchestrator around already opened stores
    pub fn with_parts(
        config: Config,
        config_hash: impl Into<String>,
        storage: SqliteStorage,
        staging: FsBatchStaging,
    ) -> Result<Self, BatonError> {
        let client = build_http_client(&config.user_agent)?;

        Ok(Self {
            config: Arc::new(config),
            config_hash: config_hash.into(),
            storage: Arc::new(Mutex::new(storage)),
            staging: Arc::new(staging),
            client,
        })
    }

    pub fn storage(&self) -> SharedStorage {
        Arc::clone(&self.storage)
    }

    pub fn staging(&self) -> &FsBatchStaging {
        &self.staging
    }

    /// Registers a new crawl and seeds its frontier
    ///
    /// Seeds are the configured start paths, or the base URL's own path
    /// when none are configured. The progress entry starts at zero.
    pub fn start_crawl(&self) -> Result<CrawlContext, BatonError> {
        let crawl = &self.config.crawl;
        let ctx = CrawlContext::new(Uuid::new_v4().to_string(), crawl.base_url.clone())
            .with_path_keywords(crawl.path_keywords.clone());
        let base = ctx.base()?;

        let mut seeds: Vec<String> = Vec::new();
        for start in &crawl.start_paths {
            let url = resolve_path(&base, start)?;
            match to_crawl_path(&base, url.as_str(), &[]) {
                Some(path) if !seeds.contains(&path) => seeds.push(path),
                Some(_) => {}
                None => tracing::warn!("Start path {} is outside {}, skipping", start, base),
            }
        }
        if seeds.is_empty() {
            seeds.push(base_path(&base));
        }

        let mut storage = self.storage.lock().unwrap();
        storage.register_crawl(&ctx)?;
        storage.enqueue(&ctx.frontier_store_address, &seeds)?;
        storage.put_progress(&ProgressEntry::new(ctx.crawl_id.clone()))?;

        tracing::info!(
            "Started crawl {} at {} with {} seed path(s)",
            ctx.crawl_id,
            ctx.base_url,
            seeds.len()
        );
        Ok(ctx)
    }

    /// Rebuilds the context of an existing crawl
    pub fn resume(&self, crawl_id: &str) -> Result<CrawlContext, BatonError> {
        let storage = self.storage.lock().unwrap();
        let ctx = storage.get_crawl(crawl_id)?;

        match storage.get_progress(crawl_id)? {
            Some(progress) => tracing::info!(
                "Resuming crawl {}: {} URLs claimed so far over {} cycles",
                crawl_id,
                progress.total_url_count,
                progress.cycle
            ),
            None => tracing::warn!("Crawl {} has no progress entry", crawl_id),
        }

        Ok(ctx)
    }

    /// Marks runs left `Running` by a dead process as interrupted
    pub fn takeover(&self, crawl_id: &str) -> Result<usize, BatonError> {
        let mut storage = self.storage.lock().unwrap();
        let interrupted = storage.interrupt_active_runs(crawl_id)?;
        if interrupted > 0 {
            tracing::warn!(
                "Took over crawl {} from {} interrupted run(s)",
                crawl_id,
                interrupted
            );
        }
        Ok(interrupted)
    }

    /// Runs the crawl until it completes, chaining continuation runs
    ///
    /// `first_mode` applies to the first cycle of the first run; every
    /// chained run starts with [`CycleMode::ContinuationStart`]. With
    /// `single-run` set, returns after the first run whatever its outcome.
    pub async fn drive(
        &self,
        ctx: &CrawlContext,
        first_mode: CycleMode,
    ) -> Result<Vec<RunOutcome>, BatonError> {
        let mut outcomes = Vec::new();
        let mut mode = first_mode;
        let mut previous = match first_mode {
            CycleMode::ContinuationStart => self.last_run_id(&ctx.crawl_id)?,
            _ => None,
        };

        loop {
            let outcome = self.run(ctx, mode, previous).await?;
            outcomes.push(outcome);

            match outcome {
                RunOutcome::Completed { .. } => break,
                RunOutcome::Continued { run_id } => {
                    if self.config.limits.single_run {
                        tracing::info!(
                            "Run {} handed over; continue with --crawl-id {}",
                            run_id,
                            ctx.crawl_id
                        );
                        break;
                    }
                    tracing::info!("Chaining continuation run after run {}", run_id);
                    mode = CycleMode::ContinuationStart;
                    previous = Some(run_id);
                }
            }
        }

        Ok(outcomes)
    }

    fn last_run_id(&self, crawl_id: &str) -> Result<Option<i64>, BatonError> {
        let storage = self.storage.lock().unwrap();
        Ok(storage.list_runs(crawl_id)?.last().map(|run| run.id))
    }

    /// Executes one run
    ///
    /// Fails with [`BatonError::CrawlBusy`] if another run of the same crawl
    /// is still open in the ledger.
    pub async fn run(
        &self,
        ctx: &CrawlContext,
        first_mode: CycleMode,
        continued_from: Option<i64>,
    ) -> Result<RunOutcome, BatonError> {
        let run_id = {
            let mut storage = self.storage.lock().unwrap();
            storage
                .create_run(&ctx.crawl_id, &self.config_hash, continued_from)
                .map_err(|e| match e {
                    StorageError::CrawlBusy { crawl_id, run_id } => BatonError::CrawlBusy(format!(
                        "{} (run {} is still running)",
                        crawl_id, run_id
                    )),
                    other => other.into(),
                })?
        };

        tracing::info!("Run {} of crawl {} started", run_id, ctx.crawl_id);

        let result = self.run_cycles(ctx, first_mode, run_id).await;

        self.close_run(run_id, result)
    }

    /// Records how a run ended and passes its result through
    ///
    /// A ledger write failure is logged; the run keeps its own result.
    fn close_run(
        &self,
        run_id: i64,
        result: Result<RunOutcome, BatonError>,
    ) -> Result<RunOutcome, BatonError> {
        let status = match &result {
            Ok(RunOutcome::Completed { .. }) => RunStatus::Completed,
            Ok(RunOutcome::Continued { .. }) => RunStatus::Continued,
            Err(_) => RunStatus::Failed,
        };
        let finished = self.storage.lock().unwrap().finish_run(run_id, status);
        if let Err(e) = finished {
            tracing::error!("Could not record run {} as {:?}: {}", run_id, status, e);
        }

        match &result {
            Ok(outcome) => tracing::info!("Run {} finished: {:?}", run_id, outcome),
            Err(e) => tracing::error!("Run {} failed: {}", run_id, e),
        }
        result
    }

    async fn run_cycles(
        &self,
        ctx: &CrawlContext,
        first_mode: CycleMode,
        run_id: i64,
    ) -> Result<RunOutcome, BatonError> {
        let mut controller =
            ContinuationController::new(ctx.clone(), CycleLimits::from(&self.config.limits));
        let mut mode = first_mode;

        if first_mode == CycleMode::ContinuationStart {
            let redelivered = self.redeliver_claimed(ctx).await?;
            if redelivered > 0 {
                tracing::info!(
                    "Run {} finished {} path(s) left by earlier runs",
                    run_id,
                    redelivered
                );
            }
        }

        loop {
            let decision = self.cycle_with_retries(&mut controller, mode).await?;
            mode = CycleMode::Steady;

            if decision.frontier_non_empty {
                let summary = self.fan_out(&decision.staged_batch).await?;
                tracing::info!(
                    "Cycle {} done: {} visited, {} failed, {} new paths",
                    decision.progress.cycle,
                    summary.visited,
                    summary.failed,
                    summary.discovered
                );
            }

            if decision.run_threshold_exceeded {
                return Ok(RunOutcome::Continued { run_id });
            }
            if !decision.frontier_non_empty {
                return Ok(RunOutcome::Completed { run_id });
            }
        }
    }

    /// Hands paths that are counted but unfinished back to workers
    ///
    /// Every batch is re-staged at the location of the cycle that claimed
    /// it. The progress counters are left alone, since the paths were
    /// counted when first claimed.
    async fn redeliver_claimed(&self, ctx: &CrawlContext) -> Result<usize, BatonError> {
        let batches = {
            let storage = self.storage.lock().unwrap();
            storage.claimed_batches(&ctx.frontier_store_address)?
        };

        let mut redelivered = 0;
        for batch in batches {
            let cycle = match cycle_of_claim_key(&ctx.crawl_id, &batch.claim_key) {
                Some(cycle) => cycle,
                None => {
                    tracing::warn!(
                        "Skipping {} path(s) held by unknown claim key {}",
                        batch.len(),
                        batch.claim_key
                    );
                    continue;
                }
            };

            let location = self.staging.location_for(&ctx.crawl_id, cycle);
            self.staging
                .write(&location, &StagedBatch::from_paths(&batch.paths, ctx))?;
            tracing::warn!(
                "Re-delivering {} unfinished path(s) from cycle {} via {}",
                batch.len(),
                cycle,
                location
            );

            let summary = self.fan_out(&location).await?;
            redelivered += summary.visited + summary.failed;
        }

        Ok(redelivered)
    }

    /// Runs a cycle, retrying whole cycles on transient store failures and
    /// only the staging write when the counters are already persisted
    async fn cycle_with_retries(
        &self,
        controller: &mut ContinuationController,
        mode: CycleMode,
    ) -> Result<CycleDecision, BatonError> {
        let attempts = self.config.limits.cycle_retries.max(1);
        let mut attempt = 1;

        loop {
            let result = {
                let mut storage = self.storage.lock().unwrap();
                controller.run_cycle(&mut *storage, self.staging.as_ref(), mode)
            };

            match result {
                Ok(decision) => return Ok(decision),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!("Cycle attempt {}/{} failed: {}", attempt, attempts, e);
                    tokio::time::sleep(backoff(attempt)).await;
                    attempt += 1;
                }
                Err(CycleError::StagingWrite {
                    location,
                    batch,
                    progress,
                    source,
                }) => {
                    tracing::warn!("Staging failed ({}), re-staging at {}", source, location);
                    let mut restage_attempt = 1;
                    loop {
                        tokio::time::sleep(backoff(restage_attempt)).await;
                        let restaged = controller.restage(
                            self.staging.as_ref(),
                            &location,
                            &batch,
                            &progress,
                        );
                        match restaged {
                            Ok(()) => {
                                return Ok(controller.decide(progress, location, batch.len()));
                            }
                            Err(e) if restage_attempt < attempts => {
                                tracing::warn!(
                                    "Re-stage attempt {}/{} failed: {}",
                                    restage_attempt,
                                    attempts,
                                    e
                                );
                                restage_attempt += 1;
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Cycle failed: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    /// Hands every item of a staged batch to a worker and waits for all
    async fn fan_out(&self, location: &StagingLocation) -> Result<FanOutSummary, BatonError> {
        let batch = self.staging.read(location)?;
        let workers = self.config.limits.max_concurrent_workers.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut handles = Vec::with_capacity(batch.len());
        for item in batch.items {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| BatonError::Worker(e.to_string()))?;
            let client = self.client.clone();
            let storage = Arc::clone(&self.storage);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let result = visit(&client, &storage, &item).await;
                (item.path, result)
            }));
        }

        let mut summary = FanOutSummary::default();
        for handle in handles {
            match handle.await {
                Ok((_, Ok(VisitOutcome::Visited { discovered }))) => {
                    summary.visited += 1;
                    summary.discovered += discovered;
                }
                Ok((_, Ok(VisitOutcome::Failed))) => summary.failed += 1,
                Ok((path, Err(e))) => {
                    tracing::warn!("Worker for {} failed: {}", path, e);
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::warn!("Worker task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

fn backoff(attempt: u32) -> Duration {
    RETRY_BASE_DELAY * 2u32.saturating_pow(attempt.saturating_sub(1).min(6))
}
