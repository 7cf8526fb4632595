//! Snap store collaborators backed by the `snap` and `unsquashfs` tools.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::model::RevisionNumber;
use crate::traits::{ArchiveFetcher, ManifestUnpacker, RegistryQuery, RevisionError, SourceError};

/// Directory unsquashfs creates when no destination is given.
pub const SQUASHFS_ROOT: &str = "squashfs-root";

/// File name `snap download` uses for a revision's archive.
pub fn archive_file_name(package: &str, revision: RevisionNumber) -> String {
    format!("{}_{}.snap", package, revision)
}

async fn run(command: &mut Command, what: &str) -> Result<Output, String> {
    let output = command
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| format!("Failed to run {}: {}", what, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{} failed ({}): {}",
            what,
            output.status,
            stderr.trim()
        ));
    }
    Ok(output)
}

/// `snap info` / `snap download` against the store.
#[derive(Debug, Clone)]
pub struct SnapStore {
    snap_bin: String,
}

impl SnapStore {
    pub fn new(snap_bin: impl Into<String>) -> Self {
        Self {
            snap_bin: snap_bin.into(),
        }
    }
}

impl Default for SnapStore {
    fn default() -> Self {
        Self::new("snap")
    }
}

#[async_trait]
impl RegistryQuery for SnapStore {
    async fn query(&self, package: &str) -> Result<String, SourceError> {
        let output = run(
            Command::new(&self.snap_bin).args(["info", package]),
            "snap info",
        )
        .await
        .map_err(SourceError::Unavailable)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ArchiveFetcher for SnapStore {
    async fn fetch(
        &self,
        package: &str,
        revision: RevisionNumber,
        workdir: &Path,
    ) -> Result<PathBuf, RevisionError> {
        let revision_arg = revision.to_string();
        run(
            Command::new(&self.snap_bin)
                .args(["download", package, "--revision", &revision_arg])
                .current_dir(workdir)
                .stdout(Stdio::null()),
            "snap download",
        )
        .await
        .map_err(RevisionError::FetchFailed)?;

        let archive = workdir.join(archive_file_name(package, revision));
        if !archive.is_file() {
            return Err(RevisionError::FetchFailed(format!(
                "snap download left no '{}'",
                archive.display()
            )));
        }
        debug!(revision, archive = %archive.display(), "Downloaded archive");
        Ok(archive)
    }
}

/// Single-file extraction with `unsquashfs`.
#[derive(Debug, Clone)]
pub struct Unsquashfs {
    bin: String,
}

impl Unsquashfs {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for Unsquashfs {
    fn default() -> Self {
        Self::new("unsquashfs")
    }
}

#[async_trait]
impl ManifestUnpacker for Unsquashfs {
    async fn unpack(
        &self,
        archive: &Path,
        inner_path: &Path,
        workdir: &Path,
    ) -> Result<PathBuf, RevisionError> {
        run(
            Command::new(&self.bin)
                .arg(archive)
                .arg(inner_path)
                .current_dir(workdir)
                .stdout(Stdio::null()),
            "unsquashfs",
        )
        .await
        .map_err(RevisionError::ExtractFailed)?;

        let relative = Path::new(SQUASHFS_ROOT).join(inner_path);
        if !workdir.join(&relative).is_file() {
            return Err(RevisionError::ExtractFailed(format!(
                "'{}' not present in {}",
                inner_path.display(),
                archive.display()
            )));
        }
        Ok(relative)
    }
}
