//! Storage traits and error types
//!
//! The controller sees its stores only through these narrow traits, so any
//! backend that can claim atomically and overwrite a keyed row can stand in
//! for the SQLite one.

use crate::state::{CrawlContext, FrontierBatch, ProgressEntry, UrlState};
use crate::storage::{RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Crawl not found: {0}")]
    CrawlNotFound(String),

    #[error("Crawl {crawl_id} already has run {run_id} in progress")]
    CrawlBusy { crawl_id: String, run_id: i64 },

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Crawl-scoped set of discovered-but-unvisited paths
pub trait FrontierStore {
    /// Adds paths to the frontier, ignoring any path it has ever seen
    ///
    /// # Returns
    ///
    /// The number of paths that were new
    fn enqueue(&mut self, address: &str, paths: &[String]) -> StorageResult<usize>;

    /// Atomically claims up to `limit` pending paths under `claim_key`
    ///
    /// Claimed paths leave the pending set in the same transaction that
    /// selects them, so concurrent claims under different keys never overlap.
    /// Paths already claimed under `claim_key` are returned first, which
    /// makes a retried claim return the batch it took before.
    fn claim_batch(
        &mut self,
        address: &str,
        claim_key: &str,
        limit: u64,
    ) -> StorageResult<FrontierBatch>;

    /// Records a worker's outcome for a claimed path
    fn complete_path(&mut self, address: &str, path: &str, state: UrlState) -> StorageResult<()>;

    /// Paths still `Claimed`, grouped by the key that claimed them
    ///
    /// These are paths a cycle counted but no worker finished, either
    /// because the batch never reached the workers or because a worker
    /// could not record its outcome.
    fn claimed_batches(&self, address: &str) -> StorageResult<Vec<FrontierBatch>>;

    /// Counts frontier paths in a given state
    fn count_by_state(&self, address: &str, state: UrlState) -> StorageResult<u64>;
}

/// Crawl-scoped progress counters
///
/// There is no compare-and-swap here. Callers must guarantee a single
/// in-flight cycle per crawl (see [`RunLedger::create_run`]).
pub trait ProgressTracker {
    fn get_progress(&self, crawl_id: &str) -> StorageResult<Option<ProgressEntry>>;

    /// Overwrites the entry for `entry.crawl_id` unconditionally
    fn put_progress(&mut self, entry: &ProgressEntry) -> StorageResult<()>;
}

/// Registry of crawls and the chained runs that execute them
pub trait RunLedger {
    /// Records a new crawl's context
    fn register_crawl(&mut self, ctx: &CrawlContext) -> StorageResult<()>;

    /// Loads a crawl's context
    fn get_crawl(&self, crawl_id: &str) -> StorageResult<CrawlContext>;

    /// Opens a run for a crawl
    ///
    /// Fails with [`StorageError::CrawlBusy`] while another run of the same
    /// crawl is still `Running`: an open run is the crawl's sequencing token.
    fn create_run(
        &mut self,
        crawl_id: &str,
        config_hash: &str,
        continued_from: Option<i64>,
    ) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Lists a crawl's runs, oldest first
    fn list_runs(&self, crawl_id: &str) -> StorageResult<Vec<RunRecord>>;

    /// Closes a run with a final status and timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks every `Running` run of the crawl as `Interrupted`
    ///
    /// Used when taking over a crawl whose previous process died.
    fn interrupt_active_runs(&mut self, crawl_id: &str) -> StorageResult<usize>;
}
