use crate::model::RevisionNumber;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures while discovering the current revision. Both are fatal to a run.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Registry query failed: {0}")]
    Unavailable(String),
    #[error("No revisions found for '{0}'")]
    NoRevisionsFound(String),
}

/// Failures isolated to a single revision.
#[derive(Error, Debug)]
pub enum RevisionError {
    #[error("Fetch failed: {0}")]
    FetchFailed(String),
    #[error("Manifest extraction failed: {0}")]
    ExtractFailed(String),
    #[error("Invalid manifest: {0}")]
    ManifestInvalid(String),
    #[error("Timed out after {0}s")]
    TimedOut(u64),
    #[error("Worker aborted: {0}")]
    WorkerAborted(String),
}

/// Answers "what does the registry know about this package" as free text.
#[async_trait]
pub trait RegistryQuery: Send + Sync {
    async fn query(&self, package: &str) -> Result<String, SourceError>;
}

/// Retrieves the archive of one revision.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Downloads `(package, revision)` into `workdir` and returns the archive path.
    async fn fetch(
        &self,
        package: &str,
        revision: RevisionNumber,
        workdir: &Path,
    ) -> Result<PathBuf, RevisionError>;
}

/// Pulls a single file out of an archive without unpacking the rest.
#[async_trait]
pub trait ManifestUnpacker: Send + Sync {
    /// Extracts `inner_path` from `archive` somewhere below `workdir` and
    /// returns the extracted file's path relative to `workdir`.
    async fn unpack(
        &self,
        archive: &Path,
        inner_path: &Path,
        workdir: &Path,
    ) -> Result<PathBuf, RevisionError>;
}
