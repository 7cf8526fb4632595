use crate::harvest::RevisionExtractor;
use crate::model::{RevisionNumber, RevisionOutcome};
use crate::traits::RevisionError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

/// Bounds how many revisions are extracted at once.
#[derive(Clone)]
pub struct HarvesterExecutor {
    semaphore: Arc<Semaphore>,
    revision_timeout: Option<Duration>,
}

impl HarvesterExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            revision_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.revision_timeout = timeout;
        self
    }

    /// Runs one revision once a worker slot is free. Never fails: every error
    /// comes back as [`RevisionOutcome::Failure`].
    #[instrument(skip(self, extractor, package))]
    pub async fn execute(
        &self,
        extractor: Arc<RevisionExtractor>,
        package: Arc<str>,
        revision: RevisionNumber,
    ) -> RevisionOutcome {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return RevisionOutcome::Failure(RevisionError::WorkerAborted(format!(
                    "Semaphore error: {}",
                    e
                )))
            }
        };

        info!("Processing revision {}", revision);

        let work = extractor.extract(&package, revision);
        let result = match self.revision_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(RevisionError::TimedOut(limit.as_secs())),
            },
            None => work.await,
        };

        result.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ArchiveFetcher, ManifestUnpacker};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Sleeps inside the fetch and tracks peak concurrency.
    #[derive(Default)]
    struct SlowFetcher {
        delay_ms: u64,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ArchiveFetcher for SlowFetcher {
        async fn fetch(
            &self,
            _package: &str,
            _revision: RevisionNumber,
            workdir: &Path,
        ) -> Result<PathBuf, RevisionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(workdir.join("archive.snap"))
        }
    }

    struct InlineUnpacker;

    #[async_trait]
    impl ManifestUnpacker for InlineUnpacker {
        async fn unpack(
            &self,
            _archive: &Path,
            _inner_path: &Path,
            workdir: &Path,
        ) -> Result<PathBuf, RevisionError> {
            std::fs::write(
                workdir.join("snap.yaml"),
                "version: '1.0'\narchitectures: [amd64]\n",
            )
            .unwrap();
            Ok(PathBuf::from("snap.yaml"))
        }
    }

    fn extractor(root: &Path, fetcher: Arc<SlowFetcher>) -> Arc<RevisionExtractor> {
        Arc::new(RevisionExtractor::new(fetcher, Arc::new(InlineUnpacker)).with_scratch_root(root))
    }

    #[tokio::test]
    async fn test_execute_success() {
        let root = tempfile::tempdir().unwrap();
        let executor = HarvesterExecutor::new(2);
        let outcome = executor
            .execute(
                extractor(root.path(), Arc::new(SlowFetcher::default())),
                Arc::from("core"),
                1,
            )
            .await;
        assert!(matches!(outcome, RevisionOutcome::Success(ref m) if m.version == "1.0"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(SlowFetcher {
            delay_ms: 5_000,
            ..Default::default()
        });
        let executor = HarvesterExecutor::new(1).with_timeout(Some(Duration::from_millis(20)));

        let outcome = executor
            .execute(extractor(root.path(), fetcher), Arc::from("core"), 1)
            .await;
        assert!(matches!(
            outcome,
            RevisionOutcome::Failure(RevisionError::TimedOut(_))
        ));
        // The cancelled extraction dropped its workspace.
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_limit_is_respected() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(SlowFetcher {
            delay_ms: 30,
            ..Default::default()
        });
        let extractor = extractor(root.path(), fetcher.clone());
        let executor = HarvesterExecutor::new(3);
        let package: Arc<str> = Arc::from("core");

        let mut handles = Vec::new();
        for revision in 1..=12 {
            let executor = executor.clone();
            let extractor = extractor.clone();
            let package = package.clone();
            handles.push(tokio::spawn(async move {
                executor.execute(extractor, package, revision).await
            }));
        }
        for handle in handles {
            assert!(matches!(handle.await.unwrap(), RevisionOutcome::Success(_)));
        }

        let peak = fetcher.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {} exceeded limit", peak);
        assert!(peak >= 1);
    }
}
