//! Baton-Crawl: a continuation-aware distributed web crawl driver
//!
//! This crate drives a crawl as a sequence of cycles. Each cycle claims a
//! bounded batch of paths from a shared frontier, advances the crawl's
//! progress counters, stages the batch for parallel workers, and reports
//! whether the current run has used up its URL budget and must hand over to
//! a continuation run.

pub mod config;
pub mod crawler;
pub mod output;
pub mod staging;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Baton-Crawl operations
#[derive(Debug, Error)]
pub enum BatonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cycle failed: {0}")]
    Cycle(#[from] crawler::CycleError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Staging error: {0}")]
    Staging(#[from] staging::StagingError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl {0} has another run in progress")]
    CrawlBusy(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    /// An environment override was not a positive integer. Never surfaced
    /// to callers: the override is dropped and the configured value kept.
    #[error("Invalid value for {name}: '{value}' (expected a positive integer)")]
    InvalidEnv { name: String, value: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Baton-Crawl operations
pub type Result<T> = std::result::Result<T, BatonError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{ContinuationController, CycleDecision, CycleMode, Orchestrator, RunOutcome};
pub use state::{CrawlContext, ProgressEntry, UrlState};
pub use crate::url::{normalize_url, to_crawl_path};
