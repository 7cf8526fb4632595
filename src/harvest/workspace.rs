//! Private scratch directories for per-revision work.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::model::RevisionNumber;

static NEXT_WORKSPACE_ID: AtomicU64 = AtomicU64::new(0);

/// Exclusively owned scratch directory for one revision.
///
/// # RAII Cleanup
///
/// The directory is removed when the guard is dropped, whichever way the
/// owning extraction exits (success, error, timeout cancelling the future).
/// It intentionally does **not** implement `Clone`: two guards for the same
/// directory would race on removal.
#[derive(Debug)]
pub struct ScratchWorkspace {
    path: PathBuf,
    revision: RevisionNumber,
    cleanup_on_drop: bool,
}

impl ScratchWorkspace {
    /// Creates a uniquely named directory below `root`.
    ///
    /// Names combine package, revision, process id and a process-wide counter,
    /// so concurrent workers never collide even within one run.
    pub fn create(
        root: &Path,
        package: &str,
        revision: RevisionNumber,
        cleanup_on_drop: bool,
    ) -> std::io::Result<Self> {
        let id = NEXT_WORKSPACE_ID.fetch_add(1, Ordering::Relaxed);
        let path = root.join(format!(
            "harvest-{}-r{}-{}-{}",
            package,
            revision,
            std::process::id(),
            id
        ));
        std::fs::create_dir_all(root)?;
        std::fs::create_dir(&path)?;
        debug!(revision, path = %path.display(), "Created scratch workspace");

        Ok(Self {
            path,
            revision,
            cleanup_on_drop,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves `relative` against the workspace root, rejecting any path
    /// that would escape it.
    pub fn safe_child(&self, relative: &Path) -> Result<PathBuf, String> {
        if relative.as_os_str().is_empty() {
            return Err("empty path".to_string());
        }
        for component in relative.components() {
            match component {
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(format!(
                        "path '{}' escapes the workspace",
                        relative.display()
                    ));
                }
                _ => {}
            }
        }
        Ok(self.path.join(relative))
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        if !self.cleanup_on_drop {
            debug!(
                revision = self.revision,
                path = %self.path.display(),
                "Keeping scratch workspace"
            );
            return;
        }
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(
                    revision = self.revision,
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove scratch workspace"
                );
            }
        }
    }
}
