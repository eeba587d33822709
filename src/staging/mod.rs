//! Batch staging for worker fan-out
//!
//! A cycle never hands its batch to workers directly. It writes the batch as
//! a JSON blob at a location derived from the crawl id and cycle number, and
//! workers read it back from there. The same cycle always maps to the same
//! location, so re-writing a batch after a failure overwrites rather than
//! duplicates.

mod fs;

pub use fs::FsBatchStaging;

use crate::state::CrawlContext;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while staging a batch
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid staged payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No staged batch at {0}")]
    NotFound(StagingLocation),
}

/// Where a staged batch lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingLocation {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for StagingLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// One unit of worker input: a path plus the crawl it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedItem {
    pub path: String,
    pub crawl_context: CrawlContext,
}

/// The batch handed to workers, stored as a JSON array of items
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagedBatch {
    pub items: Vec<StagedItem>,
}

impl StagedBatch {
    /// Pairs every path with the (unchanged) crawl context
    pub fn from_paths(paths: &[String], ctx: &CrawlContext) -> Self {
        Self {
            items: paths
                .iter()
                .map(|path| StagedItem {
                    path: path.clone(),
                    crawl_context: ctx.clone(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Write-once blob store for staged batches
pub trait BatchStaging {
    /// Deterministic location for a crawl's cycle
    fn location_for(&self, crawl_id: &str, cycle: u64) -> StagingLocation;

    /// Writes (or overwrites) the batch at `location`
    fn write(&self, location: &StagingLocation, batch: &StagedBatch) -> Result<(), StagingError>;

    fn read(&self, location: &StagingLocation) -> Result<StagedBatch, StagingError>;
}

/// Object key for a crawl's cycle
///
/// The crawl id is reduced to filename-safe characters and suffixed with a
/// short digest of the raw id, so ids that sanitize alike still get
/// distinct keys.
pub fn staging_key(crawl_id: &str, cycle: u64) -> String {
    let safe_id: String = crawl_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = hex::encode(Sha256::digest(crawl_id.as_bytes()));
    format!(
        "{}-{}.{:08}.queued-paths.json",
        safe_id,
        &digest[..8],
        cycle
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_key_is_deterministic() {
        assert_eq!(
            staging_key("abc", 7),
            "abc-ba7816bf.00000007.queued-paths.json"
        );
        assert_eq!(staging_key("abc", 7), staging_key("abc", 7));
        assert_ne!(staging_key("abc", 7), staging_key("abc", 8));
    }

    #[test]
    fn test_staging_key_sanitizes_crawl_id() {
        let key = staging_key("../x", 1);
        assert!(key.starts_with("___x-"));
        assert!(!key.contains('/'));
    }

    #[test]
    fn test_staging_keys_of_lookalike_ids_differ() {
        let keys = [
            staging_key("a.b", 1),
            staging_key("a/b", 1),
            staging_key("a_b", 1),
        ];
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[0], keys[2]);
        assert_ne!(keys[1], keys[2]);
    }

    #[test]
    fn test_staged_batch_serializes_as_item_array() {
        let ctx = CrawlContext::new("abc", "https://example.com/");
        let batch = StagedBatch::from_paths(&["/a".to_string()], &ctx);

        let json = serde_json::to_value(&batch).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["path"], "/a");
        assert_eq!(json[0]["crawlContext"]["crawlId"], "abc");
    }

    #[test]
    fn test_empty_batch_serializes_as_empty_array() {
        let json = serde_json::to_string(&StagedBatch::default()).unwrap();
        assert_eq!(json, "[]");
    }
}
