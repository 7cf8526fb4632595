//! Snap revision harvester.
//!
//! Walks every revision of a snap, pulls `meta/snap.yaml` out of each
//! archive and records the declared version and architecture per revision.

pub mod config;
pub mod executor;
pub mod harvest;
pub mod model;
pub mod traits;

// Re-export common types for convenience
pub use config::{ConfigError, HarvestConfig};
pub use executor::*;
pub use harvest::{HarvestPipeline, PipelineError, RevisionExtractor, RevisionSource};
pub use model::*;
pub use traits::*;

use std::sync::Arc;
use tracing::info;

/// Builds the pipeline that talks to the real snap store.
pub fn build_pipeline(config: &HarvestConfig) -> HarvestPipeline {
    let store = Arc::new(harvest::SnapStore::new(config.snap_bin.clone()));
    let unsquashfs = Arc::new(harvest::Unsquashfs::new(config.unsquashfs_bin.clone()));

    let extractor = RevisionExtractor::new(store.clone(), unsquashfs)
        .with_manifest_path(config.manifest_path.clone())
        .with_scratch_root(config.scratch_root())
        .with_cleanup(!config.keep_workspaces);

    HarvestPipeline::new(RevisionSource::new(store), extractor)
        .with_workers(config.workers)
        .with_timeout(config.revision_timeout())
}

/// Validates `config`, harvests every revision and writes the outputs.
pub async fn run_harvest(config: &HarvestConfig) -> Result<HarvestReport, PipelineError> {
    config.validate()?;

    let report = build_pipeline(config).run(&config.package).await?;

    harvest::write_results_file(&config.output, &report.results)?;
    if let Some(path) = &config.failures_output {
        harvest::write_failures_file(path, &report.failures)?;
        info!("Failure report saved to {}", path.display());
    }
    info!("Done! Results saved to {}", config.output.display());

    Ok(report)
}
