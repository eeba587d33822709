//! Continuation controller - one frontier cycle
//!
//! A cycle reads the crawl's progress, claims a bounded batch from the
//! frontier, persists the advanced counters, stages the batch for workers
//! and reports whether the run has gone past its URL budget.
//!
//! The counter write happens before the batch is staged. Claiming is the
//! only step that consumes anything, and claims are keyed by the cycle
//! number, so a cycle retried before its counters were written gets the
//! same batch back instead of losing it, and a cycle that fails after the
//! write only needs its staging step repeated (see
//! [`ContinuationController::restage`]).

use crate::config::LimitsConfig;
use crate::staging::{BatchStaging, StagedBatch, StagingError, StagingLocation};
use crate::state::{claim_key_for, CrawlContext, ProgressEntry};
use crate::storage::{FrontierStore, ProgressTracker, StorageError};
use thiserror::Error;

/// How a cycle treats the crawl's progress entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    /// The crawl's first cycle; a missing progress entry starts at zero
    Initializing,

    /// Any later cycle of the same run; a missing entry is fatal
    Steady,

    /// First cycle of a continuation run; the run counter restarts at zero
    ContinuationStart,
}

/// Errors that end a cycle
#[derive(Debug, Error)]
pub enum CycleError {
    /// Nothing to resume from. The crawl must be aborted rather than
    /// restarted with fabricated counters.
    #[error("No progress entry for crawl {crawl_id}")]
    ProgressNotFound { crawl_id: String },

    #[error("Failed to read progress for crawl {crawl_id}: {source}")]
    ProgressRead {
        crawl_id: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to claim from frontier {address}: {source}")]
    FrontierClaim {
        address: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to record progress for crawl {crawl_id}: {source}")]
    ProgressWrite {
        crawl_id: String,
        #[source]
        source: StorageError,
    },

    /// The counters already include this batch; only the staging write may
    /// be repeated, at the same location.
    #[error("Failed to stage batch at {location}: {source}")]
    StagingWrite {
        location: StagingLocation,
        batch: StagedBatch,
        progress: ProgressEntry,
        #[source]
        source: StagingError,
    },
}

impl CycleError {
    /// Whether the whole cycle can be run again without double counting
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProgressRead { .. } | Self::FrontierClaim { .. } | Self::ProgressWrite { .. }
        )
    }
}

/// The two budgets a cycle works against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleLimits {
    pub run_url_threshold: u64,
    pub parallel_urls_to_sync: u64,
}

impl From<&LimitsConfig> for CycleLimits {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            run_url_threshold: limits.run_url_threshold,
            parallel_urls_to_sync: limits.parallel_urls_to_sync,
        }
    }
}

/// Outcome of one cycle, consumed by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleDecision {
    /// The run has claimed more URLs than its threshold allows
    pub run_threshold_exceeded: bool,

    /// This cycle claimed at least one path
    pub frontier_non_empty: bool,

    pub crawl_context: CrawlContext,

    /// Where this cycle's batch was staged
    pub staged_batch: StagingLocation,

    /// Progress as persisted by this cycle
    pub progress: ProgressEntry,

    /// Number of paths claimed
    pub claimed: usize,
}

/// Runs frontier cycles for a single crawl
///
/// One controller serves one crawl, and `run_cycle` takes `&mut self`, so a
/// controller never has two cycles in flight. Keeping other processes off
/// the same crawl is the caller's job (the orchestrator holds an open run
/// in the run ledger for that).
#[derive(Debug)]
pub struct ContinuationController {
    ctx: CrawlContext,
    limits: CycleLimits,
}

impl ContinuationController {
    pub fn new(ctx: CrawlContext, limits: CycleLimits) -> Self {
        Self { ctx, limits }
    }

    pub fn context(&self) -> &CrawlContext {
        &self.ctx
    }

    pub fn limits(&self) -> CycleLimits {
        self.limits
    }

    /// Executes one cycle
    ///
    /// # Steps
    ///
    /// 1. Load the progress entry (zeroed when `Initializing`, run counter
    ///    reset when `ContinuationStart`)
    /// 2. Claim up to `parallel_urls_to_sync` paths under this cycle's key
    /// 3. Advance both counters by the batch size
    /// 4. Persist the counters
    /// 5. Stage the batch (empty batches included) at the cycle's location
    /// 6. Report `run_url_count > run_url_threshold` and whether anything was claimed
    pub fn run_cycle<S, B>(
        &mut self,
        store: &mut S,
        staging: &B,
        mode: CycleMode,
    ) -> Result<CycleDecision, CycleError>
    where
        S: FrontierStore + ProgressTracker + ?Sized,
        B: BatchStaging + ?Sized,
    {
        let crawl_id = self.ctx.crawl_id.clone();

        let current = store
            .get_progress(&crawl_id)
            .map_err(|source| CycleError::ProgressRead {
                crawl_id: crawl_id.clone(),
                source,
            })?;

        let current = match (current, mode) {
            (Some(entry), CycleMode::ContinuationStart) => entry.start_continuation(),
            (Some(entry), _) => entry,
            (None, CycleMode::Initializing) => {
                tracing::info!("Initializing progress for crawl {}", crawl_id);
                ProgressEntry::new(crawl_id.clone())
            }
            (None, _) => return Err(CycleError::ProgressNotFound { crawl_id }),
        };

        let cycle = current.next_cycle();
        let claim_key = claim_key_for(&crawl_id, cycle);

        let batch = store
            .claim_batch(
                &self.ctx.frontier_store_address,
                &claim_key,
                self.limits.parallel_urls_to_sync,
            )
            .map_err(|source| CycleError::FrontierClaim {
                address: self.ctx.frontier_store_address.clone(),
                source,
            })?;

        tracing::debug!("Cycle {} claimed paths: {:?}", cycle, batch.paths);

        let progress = current.advance(batch.len() as u64);
        let run_threshold_exceeded = progress.exceeds(self.limits.run_url_threshold);

        store
            .put_progress(&progress)
            .map_err(|source| CycleError::ProgressWrite {
                crawl_id: crawl_id.clone(),
                source,
            })?;

        tracing::info!(
            "Cycle {}: claimed {} paths, total {}, run {} (threshold {} exceeded: {})",
            cycle,
            batch.len(),
            progress.total_url_count,
            progress.run_url_count,
            self.limits.run_url_threshold,
            run_threshold_exceeded
        );

        let staged = StagedBatch::from_paths(&batch.paths, &self.ctx);
        let location = staging.location_for(&crawl_id, cycle);

        if let Err(source) = staging.write(&location, &staged) {
            tracing::error!(
                "Cycle {} counted {} paths but could not stage them at {}: {}",
                cycle,
                staged.len(),
                location,
                source
            );
            return Err(CycleError::StagingWrite {
                location,
                batch: staged,
                progress,
                source,
            });
        }

        Ok(self.decide(progress, location, batch.len()))
    }

    /// Builds the decision for a cycle whose counters are persisted and
    /// whose batch is staged
    pub fn decide(
        &self,
        progress: ProgressEntry,
        staged_batch: StagingLocation,
        claimed: usize,
    ) -> CycleDecision {
        CycleDecision {
            run_threshold_exceeded: progress.exceeds(self.limits.run_url_threshold),
            frontier_non_empty: claimed > 0,
            crawl_context: self.ctx.clone(),
            staged_batch,
            progress,
            claimed,
        }
    }

    /// Repeats only the staging step of a cycle whose counters were written
    pub fn restage<B>(
        &self,
        staging: &B,
        location: &StagingLocation,
        batch: &StagedBatch,
        progress: &ProgressEntry,
    ) -> Result<(), CycleError>
    where
        B: BatchStaging + ?Sized,
    {
        staging
            .write(location, batch)
            .map_err(|source| CycleError::StagingWrite {
                location: location.clone(),
                batch: batch.clone(),
                progress: progress.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::FsBatchStaging;
    use crate::state::{FrontierBatch, UrlState};
    use crate::storage::{SqliteStorage, StorageResult};
    use std::cell::Cell;
    use tempfile::TempDir;

    fn context(crawl_id: &str) -> CrawlContext {
        CrawlContext::new(crawl_id, "https://example.com/")
    }

    fn limits(threshold: u64, batch: u64) -> CycleLimits {
        CycleLimits {
            run_url_threshold: threshold,
            parallel_urls_to_sync: batch,
        }
    }

    fn seed(storage: &mut SqliteStorage, ctx: &CrawlContext, count: usize) {
        let paths: Vec<String> = (0..count).map(|i| format!("/p{}", i)).collect();
        storage.enqueue(&ctx.frontier_store_address, &paths).unwrap();
    }

    fn set_progress(storage: &mut SqliteStorage, crawl_id: &str, total: u64, run: u64) {
        storage
            .put_progress(&ProgressEntry {
                crawl_id: crawl_id.to_string(),
                total_url_count: total,
                run_url_count: run,
                cycle: 0,
            })
            .unwrap();
    }

    /// Delegates to SQLite but can be told to fail specific calls
    struct FlakyStore {
        inner: SqliteStorage,
        failing_claims: Cell<u32>,
        failing_puts: Cell<u32>,
    }

    impl FlakyStore {
        fn new(inner: SqliteStorage) -> Self {
            Self {
                inner,
                failing_claims: Cell::new(0),
                failing_puts: Cell::new(0),
            }
        }

        fn take_failure(counter: &Cell<u32>) -> bool {
            let left = counter.get();
            if left > 0 {
                counter.set(left - 1);
                true
            } else {
                false
            }
        }
    }

    impl FrontierStore for FlakyStore {
        fn enqueue(&mut self, address: &str, paths: &[String]) -> StorageResult<usize> {
            self.inner.enqueue(address, paths)
        }

        fn claim_batch(
            &mut self,
            address: &str,
            claim_key: &str,
            limit: u64,
        ) -> StorageResult<FrontierBatch> {
            if Self::take_failure(&self.failing_claims) {
                return Err(StorageError::Database("frontier unreachable".to_string()));
            }
            self.inner.claim_batch(address, claim_key, limit)
        }

        fn complete_path(
            &mut self,
            address: &str,
            path: &str,
            state: UrlState,
        ) -> StorageResult<()> {
            self.inner.complete_path(address, path, state)
        }

        fn claimed_batches(&self, address: &str) -> StorageResult<Vec<FrontierBatch>> {
            self.inner.claimed_batches(address)
        }

        fn count_by_state(&self, address: &str, state: UrlState) -> StorageResult<u64> {
            self.inner.count_by_state(address, state)
        }
    }

    impl ProgressTracker for FlakyStore {
        fn get_progress(&self, crawl_id: &str) -> StorageResult<Option<ProgressEntry>> {
            self.inner.get_progress(crawl_id)
        }

        fn put_progress(&mut self, entry: &ProgressEntry) -> StorageResult<()> {
            if Self::take_failure(&self.failing_puts) {
                return Err(StorageError::Database("write throttled".to_string()));
            }
            self.inner.put_progress(entry)
        }
    }

    /// Staging that fails its first `failures` writes
    struct FailingStaging {
        inner: FsBatchStaging,
        failures: Cell<u32>,
    }

    impl BatchStaging for FailingStaging {
        fn location_for(&self, crawl_id: &str, cycle: u64) -> StagingLocation {
            self.inner.location_for(crawl_id, cycle)
        }

        fn write(
            &self,
            location: &StagingLocation,
            batch: &StagedBatch,
        ) -> Result<(), StagingError> {
            let left = self.failures.get();
            if left > 0 {
                self.failures.set(left - 1);
                return Err(StagingError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "bucket unavailable",
                )));
            }
            self.inner.write(location, batch)
        }

        fn read(&self, location: &StagingLocation) -> Result<StagedBatch, StagingError> {
            self.inner.read(location)
        }
    }

    #[test]
    fn test_counters_advance_by_batch_size() {
        let cases = [(0, 0, 0), (0, 0, 3), (12, 4, 5), (100, 7, 9)];

        for (total, run, frontier_size) in cases {
            let dir = TempDir::new().unwrap();
            let staging = FsBatchStaging::new(dir.path()).unwrap();
            let mut storage = SqliteStorage::new_in_memory().unwrap();
            let ctx = context("c");
            seed(&mut storage, &ctx, frontier_size);
            set_progress(&mut storage, "c", total, run);

            let mut controller = ContinuationController::new(ctx, limits(1_000, 10));
            let decision = controller
                .run_cycle(&mut storage, &staging, CycleMode::Steady)
                .unwrap();

            let n = frontier_size as u64;
            assert_eq!(decision.progress.total_url_count, total + n);
            assert_eq!(decision.progress.run_url_count, run + n);
            assert_eq!(storage.get_progress("c").unwrap(), Some(decision.progress));
        }
    }

    #[test]
    fn test_threshold_boundary_is_strict() {
        for (frontier_size, expected) in [(1, false), (2, true)] {
            let dir = TempDir::new().unwrap();
            let staging = FsBatchStaging::new(dir.path()).unwrap();
            let mut storage = SqliteStorage::new_in_memory().unwrap();
            let ctx = context("c");
            seed(&mut storage, &ctx, frontier_size);
            set_progress(&mut storage, "c", 9, 9);

            let mut controller = ContinuationController::new(ctx, limits(10, 5));
            let decision = controller
                .run_cycle(&mut storage, &staging, CycleMode::Steady)
                .unwrap();

            assert_eq!(decision.progress.run_url_count, 9 + frontier_size as u64);
            assert_eq!(decision.run_threshold_exceeded, expected);
        }
    }

    #[test]
    fn test_empty_cycle_still_writes_counters_and_batch() {
        let dir = TempDir::new().unwrap();
        let staging = FsBatchStaging::new(dir.path()).unwrap();
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        set_progress(&mut storage, "c", 4, 2);

        let mut controller = ContinuationController::new(context("c"), limits(10, 5));
        let decision = controller
            .run_cycle(&mut storage, &staging, CycleMode::Steady)
            .unwrap();

        assert!(!decision.frontier_non_empty);
        assert!(!decision.run_threshold_exceeded);
        assert_eq!(decision.claimed, 0);

        let stored = storage.get_progress("c").unwrap().unwrap();
        assert_eq!(stored.total_url_count, 4);
        assert_eq!(stored.run_url_count, 2);

        let staged = staging.read(&decision.staged_batch).unwrap();
        assert!(staged.is_empty());
    }

    #[test]
    fn test_staged_items_carry_unchanged_context() {
        let dir = TempDir::new().unwrap();
        let staging = FsBatchStaging::new(dir.path()).unwrap();
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let ctx = context("c").with_path_keywords(vec!["p".to_string()]);
        seed(&mut storage, &ctx, 2);

        let mut controller = ContinuationController::new(ctx.clone(), limits(10, 5));
        let decision = controller
            .run_cycle(&mut storage, &staging, CycleMode::Initializing)
            .unwrap();

        assert_eq!(decision.crawl_context, ctx);
        let staged = staging.read(&decision.staged_batch).unwrap();
        let paths: Vec<&str> = staged.items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["/p0", "/p1"]);
        assert!(staged.items.iter().all(|i| i.crawl_context == ctx));
    }

    #[test]
    fn test_missing_progress_is_fatal_unless_initializing() {
        let dir = TempDir::new().unwrap();
        let staging = FsBatchStaging::new(dir.path()).unwrap();
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let ctx = context("c");
        seed(&mut storage, &ctx, 3);

        let mut controller = ContinuationController::new(ctx.clone(), limits(10, 5));
        for mode in [CycleMode::Steady, CycleMode::ContinuationStart] {
            let err = controller
                .run_cycle(&mut storage, &staging, mode)
                .unwrap_err();
            assert!(matches!(err, CycleError::ProgressNotFound { .. }));
            assert!(!err.is_retryable());
        }

        // Nothing was claimed by the failed cycles
        assert_eq!(
            storage
                .count_by_state(&ctx.frontier_store_address, UrlState::Queued)
                .unwrap(),
            3
        );

        let decision = controller
            .run_cycle(&mut storage, &staging, CycleMode::Initializing)
            .unwrap();
        assert_eq!(decision.progress.total_url_count, 3);
        assert_eq!(decision.progress.cycle, 1);
    }

    #[test]
    fn test_scenario_with_split_and_continuation() {
        let dir = TempDir::new().unwrap();
        let staging = FsBatchStaging::new(dir.path()).unwrap();
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let ctx = context("abc");
        seed(&mut storage, &ctx, 8);
        set_progress(&mut storage, "abc", 0, 0);

        let mut controller = ContinuationController::new(ctx, limits(5, 3));

        let first = controller
            .run_cycle(&mut storage, &staging, CycleMode::Steady)
            .unwrap();
        assert_eq!(first.progress.total_url_count, 3);
        assert_eq!(first.progress.run_url_count, 3);
        assert!(!first.run_threshold_exceeded);
        assert!(first.frontier_non_empty);

        let second = controller
            .run_cycle(&mut storage, &staging, CycleMode::Steady)
            .unwrap();
        assert_eq!(second.progress.total_url_count, 6);
        assert_eq!(second.progress.run_url_count, 6);
        assert!(second.run_threshold_exceeded);
        assert!(second.frontier_non_empty);
        assert_ne!(first.staged_batch, second.staged_batch);

        // The continuation run starts from {total: 6, run: 0}
        let third = controller
            .run_cycle(&mut storage, &staging, CycleMode::ContinuationStart)
            .unwrap();
        assert_eq!(third.claimed, 2);
        assert_eq!(third.progress.total_url_count, 8);
        assert_eq!(third.progress.run_url_count, 2);
        assert!(!third.run_threshold_exceeded);
    }

    #[test]
    fn test_claim_failure_leaves_frontier_and_counters_untouched() {
        let dir = TempDir::new().unwrap();
        let staging = FsBatchStaging::new(dir.path()).unwrap();
        let mut sqlite = SqliteStorage::new_in_memory().unwrap();
        let ctx = context("c");
        seed(&mut sqlite, &ctx, 4);
        set_progress(&mut sqlite, "c", 0, 0);

        let mut store = FlakyStore::new(sqlite);
        store.failing_claims.set(1);

        let mut controller = ContinuationController::new(ctx.clone(), limits(10, 3));
        let err = controller
            .run_cycle(&mut store, &staging, CycleMode::Steady)
            .unwrap_err();
        assert!(matches!(err, CycleError::FrontierClaim { .. }));
        assert!(err.is_retryable());
        assert_eq!(store.get_progress("c").unwrap().unwrap().total_url_count, 0);

        let decision = controller
            .run_cycle(&mut store, &staging, CycleMode::Steady)
            .unwrap();
        assert_eq!(decision.claimed, 3);
        assert_eq!(decision.progress.total_url_count, 3);
    }

    #[test]
    fn test_retry_after_failed_counter_write_reclaims_same_batch() {
        let dir = TempDir::new().unwrap();
        let staging = FsBatchStaging::new(dir.path()).unwrap();
        let mut sqlite = SqliteStorage::new_in_memory().unwrap();
        let ctx = context("c");
        seed(&mut sqlite, &ctx, 5);
        set_progress(&mut sqlite, "c", 0, 0);

        let mut store = FlakyStore::new(sqlite);
        store.failing_puts.set(1);

        let mut controller = ContinuationController::new(ctx.clone(), limits(10, 3));
        let err = controller
            .run_cycle(&mut store, &staging, CycleMode::Steady)
            .unwrap_err();
        assert!(matches!(err, CycleError::ProgressWrite { .. }));

        // The failed cycle's claim is gone from the pending set...
        assert_eq!(
            store
                .count_by_state(&ctx.frontier_store_address, UrlState::Queued)
                .unwrap(),
            2
        );

        // ...but the retry gets it back and counts it exactly once.
        let decision = controller
            .run_cycle(&mut store, &staging, CycleMode::Steady)
            .unwrap();
        assert_eq!(decision.claimed, 3);
        assert_eq!(decision.progress.total_url_count, 3);
        let staged = staging.read(&decision.staged_batch).unwrap();
        let paths: Vec<&str> = staged.items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["/p0", "/p1", "/p2"]);
    }

    #[test]
    fn test_staging_failure_is_recovered_by_restage_only() {
        let dir = TempDir::new().unwrap();
        let staging = FailingStaging {
            inner: FsBatchStaging::new(dir.path()).unwrap(),
            failures: Cell::new(1),
        };
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let ctx = context("c");
        seed(&mut storage, &ctx, 2);
        set_progress(&mut storage, "c", 0, 0);

        let mut controller = ContinuationController::new(ctx, limits(10, 5));
        let err = controller
            .run_cycle(&mut storage, &staging, CycleMode::Steady)
            .unwrap_err();
        assert!(!err.is_retryable());

        // Counters already include the batch
        assert_eq!(
            storage.get_progress("c").unwrap().unwrap().total_url_count,
            2
        );

        let (location, batch, progress) = match err {
            CycleError::StagingWrite {
                location,
                batch,
                progress,
                ..
            } => (location, batch, progress),
            other => panic!("unexpected error: {}", other),
        };
        assert_eq!(batch.len(), 2);
        assert_eq!(progress.total_url_count, 2);

        controller
            .restage(&staging, &location, &batch, &progress)
            .unwrap();
        assert_eq!(staging.read(&location).unwrap(), batch);
        assert_eq!(location, staging.location_for("c", 1));

        let decision = controller.decide(progress, location, batch.len());
        assert!(decision.frontier_non_empty);
        assert!(!decision.run_threshold_exceeded);
    }
}
