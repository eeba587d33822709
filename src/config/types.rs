use serde::Deserialize;

/// Default run-level URL budget before a continuation run is chained
pub const DEFAULT_RUN_URL_THRESHOLD: u64 = 10_000;

/// Default number of paths claimed per cycle
pub const DEFAULT_PARALLEL_URLS_TO_SYNC: u64 = 1_000;

/// Main configuration structure for Baton-Crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// What to crawl
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Root URL of the site; only links on this host and under this path are followed
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Paths seeded into the frontier when a crawl starts (defaults to the base URL's path)
    #[serde(rename = "start-paths", default)]
    pub start_paths: Vec<String>,

    /// When non-empty, only paths containing one of these keywords are enqueued
    #[serde(rename = "path-keywords", default)]
    pub path_keywords: Vec<String>,
}

/// Cycle and run budgets
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// URLs a single run may claim before a continuation run is chained
    #[serde(rename = "run-url-threshold", default = "default_run_url_threshold")]
    pub run_url_threshold: u64,

    /// Maximum number of paths claimed (and fanned out) per cycle
    #[serde(
        rename = "parallel-urls-to-sync",
        default = "default_parallel_urls_to_sync"
    )]
    pub parallel_urls_to_sync: u64,

    /// Maximum number of workers fetching pages at the same time
    #[serde(
        rename = "max-concurrent-workers",
        default = "default_max_concurrent_workers"
    )]
    pub max_concurrent_workers: u32,

    /// Attempts at a whole cycle (or a re-stage) before the run fails
    #[serde(rename = "cycle-retries", default = "default_cycle_retries")]
    pub cycle_retries: u32,

    /// Stop after the first run split instead of chaining continuation runs in-process
    #[serde(rename = "single-run", default)]
    pub single_run: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            run_url_threshold: default_run_url_threshold(),
            parallel_urls_to_sync: default_parallel_urls_to_sync(),
            max_concurrent_workers: default_max_concurrent_workers(),
            cycle_retries: default_cycle_retries(),
            single_run: false,
        }
    }
}

fn default_run_url_threshold() -> u64 {
    DEFAULT_RUN_URL_THRESHOLD
}

fn default_parallel_urls_to_sync() -> u64 {
    DEFAULT_PARALLEL_URLS_TO_SYNC
}

fn default_max_concurrent_workers() -> u32 {
    16
}

fn default_cycle_retries() -> u32 {
    3
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding frontier, progress and runs
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory where staged batches are written
    #[serde(rename = "staging-dir")]
    pub staging_dir: String,
}
