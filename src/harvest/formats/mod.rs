//! Package format implementations.
//!
//! Concrete registry, download and unpack collaborators for each supported
//! package format. Only snaps are implemented.

pub mod snap;

pub use snap::{SnapStore, Unsquashfs};
