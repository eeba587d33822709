//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - The per-crawl frontier with atomic batch claims
//! - Progress counters
//! - Crawl registration and run tracking for continuations

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{FrontierStore, ProgressTracker, RunLedger, StorageError, StorageResult};

use crate::BatonError;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(BatonError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, BatonError> {
    SqliteStorage::new(path)
}

/// Represents one run of a crawl
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub crawl_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    /// The run this one continues, if it was chained after a split
    pub continued_from: Option<i64>,
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// The frontier was exhausted
    Completed,
    /// The run used up its URL budget and handed over to a continuation run
    Continued,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Continued => "continued",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "continued" => Some(Self::Continued),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Continued,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }
}
