//! Fetch → unpack → parse for one revision.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yml::Value;
use tracing::debug;

use crate::harvest::workspace::ScratchWorkspace;
use crate::model::{RevisionMetadata, RevisionNumber};
use crate::traits::{ArchiveFetcher, ManifestUnpacker, RevisionError};

/// Manifest keys holding the target architecture, in order of precedence.
const ARCHITECTURE_KEYS: [&str; 2] = ["architectures", "architecture"];

/// Parses a snap manifest into [`RevisionMetadata`].
///
/// `version` may be a string or a bare YAML number (`version: 2.1`), which is
/// rendered back to text. The architecture is read from `architectures`, or
/// from `architecture` when the plural key is absent; either may hold a list
/// or a single string. A present but empty list is invalid and does not fall
/// through to the other key.
pub fn parse_manifest(text: &str) -> Result<RevisionMetadata, RevisionError> {
    let doc: Value = serde_yml::from_str(text)
        .map_err(|e| RevisionError::ManifestInvalid(format!("not valid YAML: {}", e)))?;
    if !doc.is_mapping() {
        return Err(RevisionError::ManifestInvalid(
            "manifest is not a mapping".to_string(),
        ));
    }

    let version = match doc.get("version") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(RevisionError::ManifestInvalid(
                "'version' is not a scalar".to_string(),
            ))
        }
        None => {
            return Err(RevisionError::ManifestInvalid(
                "missing 'version'".to_string(),
            ))
        }
    };

    let (key, value) = ARCHITECTURE_KEYS
        .iter()
        .find_map(|key| doc.get(*key).map(|value| (*key, value)))
        .ok_or_else(|| RevisionError::ManifestInvalid("missing 'architectures'".to_string()))?;

    let architecture = match value {
        Value::String(s) => s.clone(),
        Value::Sequence(items) => match items.first() {
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(RevisionError::ManifestInvalid(format!(
                    "first entry of '{}' is not a string",
                    key
                )))
            }
            None => {
                return Err(RevisionError::ManifestInvalid(format!(
                    "'{}' is empty",
                    key
                )))
            }
        },
        _ => {
            return Err(RevisionError::ManifestInvalid(format!(
                "'{}' is neither a list nor a string",
                key
            )))
        }
    };

    Ok(RevisionMetadata {
        version,
        architecture,
    })
}

/// Extracts [`RevisionMetadata`] for single revisions.
///
/// Stateless apart from its collaborators; safe to share across workers.
pub struct RevisionExtractor {
    fetcher: Arc<dyn ArchiveFetcher>,
    unpacker: Arc<dyn ManifestUnpacker>,
    manifest_path: PathBuf,
    scratch_root: PathBuf,
    cleanup: bool,
}

impl RevisionExtractor {
    /// Default configuration:
    /// - Manifest: `meta/snap.yaml`
    /// - Scratch root: system temp dir
    /// - Cleanup: enabled
    pub fn new(fetcher: Arc<dyn ArchiveFetcher>, unpacker: Arc<dyn ManifestUnpacker>) -> Self {
        Self {
            fetcher,
            unpacker,
            manifest_path: PathBuf::from("meta/snap.yaml"),
            scratch_root: std::env::temp_dir(),
            cleanup: true,
        }
    }

    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// If `false`, workspaces are left on disk after each revision.
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub async fn extract(
        &self,
        package: &str,
        revision: RevisionNumber,
    ) -> Result<RevisionMetadata, RevisionError> {
        // Dropped on every return below, including cancellation by timeout.
        let workspace =
            ScratchWorkspace::create(&self.scratch_root, package, revision, self.cleanup)
                .map_err(|e| {
                    RevisionError::FetchFailed(format!("cannot create workspace: {}", e))
                })?;

        debug!(revision, "Fetching archive");
        let archive = self
            .fetcher
            .fetch(package, revision, workspace.path())
            .await?;

        debug!(revision, archive = %archive.display(), "Extracting {}", self.manifest_path.display());
        let relative = self
            .unpacker
            .unpack(&archive, &self.manifest_path, workspace.path())
            .await?;
        let manifest_file = workspace
            .safe_child(&relative)
            .map_err(RevisionError::ExtractFailed)?;

        let text = read_manifest(&manifest_file).await?;
        let metadata = parse_manifest(&text)?;
        debug!(
            revision,
            version = %metadata.version,
            architecture = %metadata.architecture,
            "Parsed manifest"
        );
        Ok(metadata)
    }
}

async fn read_manifest(path: &Path) -> Result<String, RevisionError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        RevisionError::ExtractFailed(format!("manifest '{}' unreadable: {}", path.display(), e))
    })
}
