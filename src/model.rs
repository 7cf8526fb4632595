use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::traits::RevisionError;

/// One published build of a snap. Revisions start at 1.
pub type RevisionNumber = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMetadata {
    pub version: String,
    pub architecture: String, // first entry of the manifest's architecture list
}

/// What a single worker produced for one revision.
#[derive(Debug)]
pub enum RevisionOutcome {
    Success(RevisionMetadata),
    Failure(RevisionError),
}

impl From<Result<RevisionMetadata, RevisionError>> for RevisionOutcome {
    fn from(result: Result<RevisionMetadata, RevisionError>) -> Self {
        match result {
            Ok(metadata) => RevisionOutcome::Success(metadata),
            Err(err) => RevisionOutcome::Failure(err),
        }
    }
}

/// A revision that was submitted but produced no metadata.
#[derive(Debug, Clone, Serialize)]
pub struct RevisionFailure {
    pub revision: RevisionNumber,
    pub error: String,
}

/// Successful revisions of one run.
///
/// Collection happens in completion order; [`ResultSet::rows`] is the only
/// way to iterate and always yields ascending revision numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    entries: HashMap<RevisionNumber, RevisionMetadata>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, revision: RevisionNumber, metadata: RevisionMetadata) {
        self.entries.insert(revision, metadata);
    }

    pub fn get(&self, revision: RevisionNumber) -> Option<&RevisionMetadata> {
        self.entries.get(&revision)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted ascending by revision.
    pub fn rows(&self) -> Vec<(RevisionNumber, &RevisionMetadata)> {
        let mut rows: Vec<_> = self.entries.iter().map(|(rev, meta)| (*rev, meta)).collect();
        rows.sort_unstable_by_key(|(rev, _)| *rev);
        rows
    }
}

/// Counters for a finished run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct HarvestStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

/// Everything one orchestration run produced.
#[derive(Debug)]
pub struct HarvestReport {
    pub package: String,
    pub current_revision: RevisionNumber,
    pub results: ResultSet,
    pub failures: Vec<RevisionFailure>,
    pub stats: HarvestStats,
}
