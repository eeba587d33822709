//! Configuration module for Baton-Crawl
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and applying the environment overrides for the run budgets.
//!
//! # Example
//!
//! ```no_run
//! use baton_crawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Run threshold: {}", config.limits.run_url_threshold);
//! ```

mod env;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlConfig, LimitsConfig, OutputConfig, UserAgentConfig,
    DEFAULT_PARALLEL_URLS_TO_SYNC, DEFAULT_RUN_URL_THRESHOLD,
};

pub use env::{
    apply_env_overrides, apply_env_overrides_from, parse_positive_int, PARALLEL_URLS_TO_SYNC_ENV,
    RUN_URL_THRESHOLD_ENV,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
