//! Image store helpers shared by `pull`, `run`, and `list --images`.

use std::fs;
use std::path::{Path, PathBuf};

use corral_oci::{ImageFetcher, ImageReference};

use crate::home::Home;

/// Directory a reference resolves to under `home.images`.
pub fn image_dir(home: &Home, reference: &ImageReference) -> PathBuf {
    home.images.join(reference.normalized())
}

/// True if `dir` exists and has at least one entry.
fn is_populated(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Ensures `reference` is present in the image store, per §4.J's
/// idempotence contract: an already-populated directory is left untouched,
/// a fetch failure leaves nothing behind.
///
/// Registry transport is out of scope for this runtime; the only
/// [`corral_oci::ImageFetcher`] wired up here reports that plainly rather
/// than pretending to succeed. Images are expected to be staged into
/// `_images/<name>_<tag>/` ahead of time by whatever export or mirroring
/// tool a deployment chooses.
pub fn ensure_pulled(home: &Home, reference: &ImageReference) -> anyhow::Result<PathBuf> {
    let dir = image_dir(home, reference);
    if is_populated(&dir) {
        return Ok(dir);
    }

    fs::create_dir_all(&dir)?;
    let fetch_result = UnavailableFetcher.fetch(reference, &dir);
    if fetch_result.is_err() {
        let _ = fs::remove_dir_all(&dir);
    }
    fetch_result?;
    Ok(dir)
}

struct UnavailableFetcher;

impl ImageFetcher for UnavailableFetcher {
    fn fetch(&self, reference: &ImageReference, _target_dir: &Path) -> corral_oci::Result<()> {
        Err(corral_oci::Error::MalformedImage {
            path: PathBuf::new(),
            reason: format!(
                "no registry fetcher configured; stage {reference} into the image store manually"
            ),
        })
    }
}
