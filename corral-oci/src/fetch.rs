//! The contract boundary to an external image downloader.
//!
//! Registry network transport is out of scope for this crate; callers supply
//! their own [`ImageFetcher`] (HTTP registry client, local cache mirror, test
//! double, ...).

use std::path::Path;

use crate::reference::ImageReference;
use crate::Result;

/// Populates a directory on disk with an OCI-or-Docker-layout image tree for
/// the given reference.
///
/// Implementations must guarantee that on success, `target_dir` contains a
/// tree [`crate::resolve_layout`] can classify. Callers may skip fetching
/// when `target_dir` already exists and is non-empty, and must remove
/// `target_dir` on fetch failure.
pub trait ImageFetcher {
    /// Fetches `reference` into `target_dir`.
    fn fetch(&self, reference: &ImageReference, target_dir: &Path) -> Result<()>;
}
