//! Revision harvest orchestrator.
//!
//! [`HarvestPipeline`] discovers the current revision, fans every revision in
//! `[1, current]` out to a bounded worker pool and fans the outcomes back in:
//! - Async execution via `tokio` tasks, bounded by [`HarvesterExecutor`]
//! - Optional per-revision timeout
//! - Structured logging via `tracing`
//! - Per-revision failures are recorded, never fatal

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::executor::HarvesterExecutor;
use crate::harvest::extractor::RevisionExtractor;
use crate::harvest::source::RevisionSource;
use crate::model::{
    HarvestReport, HarvestStats, ResultSet, RevisionFailure, RevisionNumber, RevisionOutcome,
};
use crate::traits::{RevisionError, SourceError};

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that abort a whole run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The current revision could not be determined
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Results could not be written
    #[error(transparent)]
    Sink(#[from] crate::harvest::sink::SinkError),

    /// Configuration was rejected
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Revisions to process, newest first so a saturated pool starts with the
/// most relevant builds.
pub fn revision_domain(current: RevisionNumber) -> Vec<RevisionNumber> {
    (1..=current).rev().collect()
}

/// Bounded-concurrency harvest over every revision of a package.
///
/// # Example
///
/// ```ignore
/// let pipeline = HarvestPipeline::new(source, extractor)
///     .with_workers(8)
///     .with_timeout(Some(Duration::from_secs(600)));
///
/// let report = pipeline.run("pc-kernel").await?;
/// println!("{} revisions harvested", report.results.len());
/// ```
pub struct HarvestPipeline {
    source: RevisionSource,
    extractor: Arc<RevisionExtractor>,

    /// Concurrent workers (default: host parallelism)
    workers: usize,

    /// Per-revision limit (default: none)
    revision_timeout: Option<Duration>,
}

impl HarvestPipeline {
    pub fn new(source: RevisionSource, extractor: RevisionExtractor) -> Self {
        Self {
            source,
            extractor: Arc::new(extractor),
            workers: crate::config::default_workers(),
            revision_timeout: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.revision_timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Harvests every revision of `package`.
    ///
    /// # Errors
    ///
    /// Only discovery failures are returned. Every per-revision failure ends
    /// up in [`HarvestReport::failures`] instead.
    pub async fn run(&self, package: &str) -> Result<HarvestReport, PipelineError> {
        let start = Instant::now();

        let current = self.source.current_revision(package).await?;
        let revisions = revision_domain(current);
        info!(
            "Processing {} revisions with {} workers",
            revisions.len(),
            self.workers
        );

        let executor = HarvesterExecutor::new(self.workers).with_timeout(self.revision_timeout);
        let package_name: Arc<str> = Arc::from(package);

        // Tasks queue on the executor's semaphore; at most `workers` run at once.
        let mut tasks = JoinSet::new();
        for &revision in &revisions {
            let executor = executor.clone();
            let extractor = Arc::clone(&self.extractor);
            let package_name = Arc::clone(&package_name);
            tasks.spawn(async move {
                let outcome = executor.execute(extractor, package_name, revision).await;
                (revision, outcome)
            });
        }

        // Single collection point: workers never touch the result set.
        let mut results = ResultSet::new();
        let mut failures = Vec::new();
        let mut aborted = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((revision, RevisionOutcome::Success(metadata))) => {
                    results.insert(revision, metadata);
                }
                Ok((revision, RevisionOutcome::Failure(err))) => {
                    error!(revision, "Error processing revision {}: {}", revision, err);
                    failures.push(RevisionFailure {
                        revision,
                        error: err.to_string(),
                    });
                }
                Err(join_err) => {
                    error!("Worker task aborted: {}", join_err);
                    aborted += 1;
                }
            }
        }

        // A panicked task loses its revision number; recover it from the gap.
        if aborted > 0 {
            for &revision in &revisions {
                let reported = results.get(revision).is_some()
                    || failures.iter().any(|f| f.revision == revision);
                if !reported {
                    failures.push(RevisionFailure {
                        revision,
                        error: RevisionError::WorkerAborted("task panicked".to_string())
                            .to_string(),
                    });
                }
            }
        }
        failures.sort_unstable_by_key(|f| f.revision);

        let stats = HarvestStats {
            processed: revisions.len(),
            succeeded: results.len(),
            failed: failures.len(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            duration_ms = stats.total_duration_ms,
            "Harvest completed"
        );

        Ok(HarvestReport {
            package: package.to_string(),
            current_revision: current,
            results,
            failures,
            stats,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::sink::write_results;
    use crate::traits::{ArchiveFetcher, ManifestUnpacker, RegistryQuery};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    const SNAP_INFO: &str = "\
channels:
  latest/stable:    2.1  2024-01-10 (10) 280MB -
  latest/candidate: 2.1  2023-12-01  (7) 280MB -
  latest/beta:      2.1  2024-02-02 (15) 281MB -
";

    struct MockRegistry(Option<&'static str>);

    #[async_trait]
    impl RegistryQuery for MockRegistry {
        async fn query(&self, _package: &str) -> Result<String, SourceError> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| SourceError::Unavailable("snap info exited 1".to_string()))
        }
    }

    // Fails the listed revisions; sleeps longer for lower revisions so
    // completions arrive out of submission order.
    #[derive(Default)]
    struct MockFetcher {
        failing: HashSet<RevisionNumber>,
        panicking: HashSet<RevisionNumber>,
        calls: Mutex<Vec<RevisionNumber>>,
    }

    #[async_trait]
    impl ArchiveFetcher for MockFetcher {
        async fn fetch(
            &self,
            package: &str,
            revision: RevisionNumber,
            workdir: &Path,
        ) -> Result<PathBuf, RevisionError> {
            self.calls.lock().unwrap().push(revision);
            tokio::time::sleep(Duration::from_millis((revision * 7) % 11)).await;
            if self.panicking.contains(&revision) {
                panic!("fetcher blew up on {}", revision);
            }
            if self.failing.contains(&revision) {
                return Err(RevisionError::FetchFailed(format!(
                    "revision {} not downloadable",
                    revision
                )));
            }
            let archive = workdir.join(format!("{}_{}.snap", package, revision));
            std::fs::write(&archive, b"squashfs").unwrap();
            Ok(archive)
        }
    }

    struct MockUnpacker;

    #[async_trait]
    impl ManifestUnpacker for MockUnpacker {
        async fn unpack(
            &self,
            _archive: &Path,
            inner_path: &Path,
            workdir: &Path,
        ) -> Result<PathBuf, RevisionError> {
            let relative = Path::new("squashfs-root").join(inner_path);
            let target = workdir.join(&relative);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, "version: 2.1\narchitectures:\n  - amd64\n").unwrap();
            Ok(relative)
        }
    }

    fn pipeline(
        root: &Path,
        registry: Option<&'static str>,
        fetcher: Arc<MockFetcher>,
        workers: usize,
    ) -> HarvestPipeline {
        let source = RevisionSource::new(Arc::new(MockRegistry(registry)));
        let extractor =
            RevisionExtractor::new(fetcher, Arc::new(MockUnpacker)).with_scratch_root(root);
        HarvestPipeline::new(source, extractor).with_workers(workers)
    }

    #[test]
    fn test_revision_domain_is_descending_and_complete() {
        assert_eq!(revision_domain(4), vec![4, 3, 2, 1]);
        assert!(revision_domain(0).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_failing_revision_is_isolated() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher {
            failing: HashSet::from([7]),
            ..Default::default()
        });

        let report = pipeline(root.path(), Some(SNAP_INFO), fetcher.clone(), 4)
            .run("pc-kernel")
            .await
            .unwrap();

        assert_eq!(report.current_revision, 15);
        assert_eq!(report.results.len(), 14);
        assert!(report.results.get(7).is_none());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].revision, 7);
        assert_eq!(report.stats.processed, 15);
        assert_eq!(report.stats.succeeded, 14);
        assert_eq!(report.stats.failed, 1);

        let expected: Vec<RevisionNumber> = (1..=6).chain(8..=15).collect();
        let rows = report.results.rows();
        let revisions: Vec<_> = rows.iter().map(|(rev, _)| *rev).collect();
        assert_eq!(revisions, expected);
        assert!(rows
            .iter()
            .all(|(_, m)| m.version == "2.1" && m.architecture == "amd64"));

        // Each revision fetched exactly once.
        let mut calls = fetcher.calls.lock().unwrap().clone();
        calls.sort_unstable();
        assert_eq!(calls, (1..=15).collect::<Vec<_>>());

        // All workspaces cleaned up.
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_source_failure_is_fatal_and_schedules_nothing() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher::default());

        let err = pipeline(root.path(), None, fetcher.clone(), 2)
            .run("pc-kernel")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Source(SourceError::Unavailable(_))));
        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_revisions_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let err = pipeline(
            root.path(),
            Some("name: pc-kernel\n"),
            Arc::new(MockFetcher::default()),
            2,
        )
        .run("pc-kernel")
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Source(SourceError::NoRevisionsFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_runs_write_identical_output() {
        let root = tempfile::tempdir().unwrap();
        let mut outputs = Vec::new();
        for workers in [1, 6] {
            let fetcher = Arc::new(MockFetcher {
                failing: HashSet::from([3, 11]),
                ..Default::default()
            });
            let report = pipeline(root.path(), Some(SNAP_INFO), fetcher, workers)
                .run("pc-kernel")
                .await
                .unwrap();
            let mut buf = Vec::new();
            write_results(&mut buf, &report.results).unwrap();
            outputs.push(buf);
        }
        assert_eq!(outputs[0], outputs[1]);
        assert!(String::from_utf8(outputs[0].clone())
            .unwrap()
            .starts_with("revision,version,architecture\n1,2.1,amd64\n2,2.1,amd64\n4,"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_worker_is_recorded_as_failure() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher {
            panicking: HashSet::from([2]),
            ..Default::default()
        });

        let report = pipeline(root.path(), Some(SNAP_INFO), fetcher, 3)
            .run("pc-kernel")
            .await
            .unwrap();
        assert_eq!(report.results.len(), 14);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].revision, 2);
        assert!(report.failures[0].error.contains("Worker aborted"));
    }
}
