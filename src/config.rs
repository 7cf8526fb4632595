//! Configuration for a harvest run.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Everything a harvest run needs. Every field has a default, so an empty
/// file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Snap to harvest
    pub package: String,

    /// Concurrent workers (default: host parallelism)
    pub workers: usize,

    /// CSV destination
    pub output: PathBuf,

    /// Optional JSON report of failed revisions
    pub failures_output: Option<PathBuf>,

    /// Per-revision limit in seconds; unset means no limit
    pub revision_timeout_secs: Option<u64>,

    /// `snap` executable
    pub snap_bin: String,

    /// `unsquashfs` executable
    pub unsquashfs_bin: String,

    /// Manifest location inside the archive
    pub manifest_path: PathBuf,

    /// Parent of per-revision scratch directories (default: system temp dir)
    pub scratch_root: Option<PathBuf>,

    /// Leave scratch directories behind for inspection
    pub keep_workspaces: bool,
}

/// Host processing units, or 1 if unknown.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            package: "pc-kernel".to_string(),
            workers: default_workers(),
            output: PathBuf::from("results.csv"),
            failures_output: None,
            revision_timeout_secs: None,
            snap_bin: "snap".to_string(),
            unsquashfs_bin: "unsquashfs".to_string(),
            manifest_path: PathBuf::from("meta/snap.yaml"),
            scratch_root: None,
            keep_workspaces: false,
        }
    }
}

impl HarvestConfig {
    /// Loads YAML or JSON, chosen by extension (YAML otherwise).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }

    pub fn revision_timeout(&self) -> Option<Duration> {
        self.revision_timeout_secs.map(Duration::from_secs)
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.package.trim().is_empty() {
            return Err(ConfigError::Invalid("package must not be empty".into()));
        }
        if self.package.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "package '{}' is not a valid snap name",
                self.package
            )));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be > 0".into()));
        }
        if self.revision_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "revision_timeout_secs must be > 0".into(),
            ));
        }
        let manifest = &self.manifest_path;
        if manifest.as_os_str().is_empty()
            || manifest
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ConfigError::Invalid(format!(
                "manifest_path '{}' must be relative to the archive root",
                manifest.display()
            )));
        }
        Ok(())
    }
}
