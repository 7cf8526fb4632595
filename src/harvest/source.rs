//! Discovery of the newest published revision.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info};

use crate::model::RevisionNumber;
use crate::traits::{RegistryQuery, SourceError};

/// Matches revision records such as `2024-03-18  (1842)`.
static REVISION_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}\s+\((\d+)\)").expect("revision record pattern is valid")
});

/// Every revision number mentioned in registry output, in order of appearance.
pub fn scan_revisions(text: &str) -> Vec<RevisionNumber> {
    REVISION_RECORD
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect()
}

/// Highest revision number in registry output.
pub fn max_revision(package: &str, text: &str) -> Result<RevisionNumber, SourceError> {
    scan_revisions(text)
        .into_iter()
        .max()
        .ok_or_else(|| SourceError::NoRevisionsFound(package.to_string()))
}

pub struct RevisionSource {
    registry: Arc<dyn RegistryQuery>,
}

impl RevisionSource {
    pub fn new(registry: Arc<dyn RegistryQuery>) -> Self {
        Self { registry }
    }

    /// Queries the registry and returns the current revision of `package`.
    pub async fn current_revision(&self, package: &str) -> Result<RevisionNumber, SourceError> {
        let text = self.registry.query(package).await?;
        debug!(package, bytes = text.len(), "Registry answered");

        let current = max_revision(package, &text)?;
        info!(package, current_revision = current, "Current revision");
        Ok(current)
    }
}
