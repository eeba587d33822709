//! Filesystem-backed batch staging
//!
//! The bucket is a directory and each key a file inside it. Writes go to a
//! temporary file first and are renamed into place, so a reader never sees
//! a half-written batch and a retried write simply replaces the file.

use crate::staging::{staging_key, BatchStaging, StagedBatch, StagingError, StagingLocation};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stages batches as JSON files under a root directory
#[derive(Debug, Clone)]
pub struct FsBatchStaging {
    root: PathBuf,
}

impl FsBatchStaging {
    /// Creates the staging root if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StagingError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, location: &StagingLocation) -> PathBuf {
        PathBuf::from(&location.bucket).join(&location.key)
    }
}

impl BatchStaging for FsBatchStaging {
    fn location_for(&self, crawl_id: &str, cycle: u64) -> StagingLocation {
        StagingLocation {
            bucket: self.root.display().to_string(),
            key: staging_key(crawl_id, cycle),
        }
    }

    fn write(&self, location: &StagingLocation, batch: &StagedBatch) -> Result<(), StagingError> {
        let target = self.file_for(location);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let payload = serde_json::to_vec(batch)?;
        let tmp = target.with_extension("json.tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &target)?;

        tracing::debug!("Staged {} paths at {}", batch.len(), location);
        Ok(())
    }

    fn read(&self, location: &StagingLocation) -> Result<StagedBatch, StagingError> {
        let content = match std::fs::read(self.file_for(location)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StagingError::NotFound(location.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&content)?)
    }
}
