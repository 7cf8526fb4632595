//! Harvest module - revision discovery, extraction and aggregation.
//!
//! - **Source**: current revision lookup via [`RevisionSource`]
//! - **Extractor**: per-revision fetch/unpack/parse via [`RevisionExtractor`]
//! - **Pipeline**: bounded fan-out/fan-in via [`HarvestPipeline`]
//! - **Sink**: CSV and JSON output
//! - **Formats**: snap store collaborators

pub mod extractor;
pub mod formats;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod workspace;

pub use extractor::{parse_manifest, RevisionExtractor};
pub use formats::{SnapStore, Unsquashfs};
pub use pipeline::{revision_domain, HarvestPipeline, PipelineError};
pub use sink::{write_failures_file, write_results, write_results_file, SinkError};
pub use source::{max_revision, scan_revisions, RevisionSource};
pub use workspace::ScratchWorkspace;
