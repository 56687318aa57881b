//! Image store layout resolution.
//!
//! Classifies a pulled image directory into one of the shapes
//! [`docker save`] and OCI-layout tooling produce, so the rest of the crate
//! can read manifests and layers without caring which one it is.
//!
//! [`docker save`]: https://docs.docker.com/engine/reference/commandline/save/

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// The manifest location and shape of a pulled image directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLayout {
    /// OCI image layout: `index.json` pointing at blobs under `blobs/sha256/`.
    Oci(OciLayout),
    /// `docker save` tarball layout: a top-level `manifest.json` array.
    DockerSave {
        /// Filename (relative to the image root) of the config blob.
        config_filename: String,
        /// Paths to each layer's `layer.tar`, in application order.
        layer_paths: Vec<PathBuf>,
    },
    /// No manifest at all — inferred purely from `layer.tar`-bearing subdirectories.
    LayersOnly {
        /// Subdirectories found to contain a `layer.tar` member.
        layer_dirs: Vec<PathBuf>,
    },
}

/// Detail for the [`ImageLayout::Oci`] variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciLayout {
    /// Digest of the first manifest listed in `index.json`.
    pub index_digest: String,
    /// Set when resolution fell through to the bare-config-blob case (§4.B
    /// step 3): the literal filename of a top-level JSON file that stands
    /// in for both the index and the config, with no `blobs/sha256/` tree
    /// and no layers.
    pub degenerate_config_filename: Option<String>,
}

#[derive(serde::Deserialize)]
struct DockerManifestEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

#[derive(serde::Deserialize)]
struct OciIndex {
    manifests: Vec<OciIndexEntry>,
}

#[derive(serde::Deserialize)]
struct OciIndexEntry {
    digest: String,
}

/// Resolves an image directory into its [`ImageLayout`].
///
/// Resolution order is deterministic and documented in spec §4.B: Docker-save
/// manifest first, then OCI index, then a bare top-level config blob, then a
/// directory scan for `layer.tar` members, then failure.
pub fn resolve_layout(dir: &Path) -> Result<ImageLayout> {
    let manifest_json = dir.join("manifest.json");
    if manifest_json.is_file() {
        return resolve_docker_save(dir, &manifest_json);
    }

    let index_json = dir.join("index.json");
    if index_json.is_file() {
        return resolve_oci_index(dir, &index_json);
    }

    if let Some(config_filename) = find_bare_config_blob(dir)? {
        return Ok(ImageLayout::Oci(OciLayout {
            index_digest: config_filename.clone(),
            degenerate_config_filename: Some(config_filename),
        }));
    }

    let layer_dirs = find_layer_only_dirs(dir)?;
    if !layer_dirs.is_empty() {
        return Ok(ImageLayout::LayersOnly { layer_dirs });
    }

    Err(Error::MalformedImage {
        path: dir.to_path_buf(),
        reason: "no recognizable image data".into(),
    })
}

fn resolve_docker_save(dir: &Path, manifest_json: &Path) -> Result<ImageLayout> {
    let data = fs::read_to_string(manifest_json).map_err(|e| Error::io(manifest_json, e))?;
    let entries: Vec<DockerManifestEntry> =
        serde_json::from_str(&data).map_err(|e| Error::json(manifest_json, e))?;

    let first = entries.first().ok_or_else(|| Error::MalformedImage {
        path: manifest_json.to_path_buf(),
        reason: "manifest.json is an empty array".into(),
    })?;

    let layer_paths = first.layers.iter().map(|l| dir.join(l)).collect();

    Ok(ImageLayout::DockerSave {
        config_filename: first.config.clone(),
        layer_paths,
    })
}

fn resolve_oci_index(dir: &Path, index_json: &Path) -> Result<ImageLayout> {
    let data = fs::read_to_string(index_json).map_err(|e| Error::io(index_json, e))?;
    let index: OciIndex = serde_json::from_str(&data).map_err(|e| Error::json(index_json, e))?;

    let first = index.manifests.first().ok_or_else(|| Error::MalformedImage {
        path: index_json.to_path_buf(),
        reason: "index.json has no manifests".into(),
    })?;

    let _ = dir; // layout only needs the digest; blob reading happens in manifest.rs
    Ok(ImageLayout::Oci(OciLayout {
        index_digest: first.digest.clone(),
        degenerate_config_filename: None,
    }))
}

/// Step 3 of §4.B: a non-directory `*.json` file other than `manifest.json`,
/// sitting directly under the image root.
fn find_bare_config_blob(dir: &Path) -> Result<Option<String>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == "manifest.json" || name == "index.json" {
            continue;
        }
        if name.ends_with(".json") {
            return Ok(Some(name.to_owned()));
        }
    }
    Ok(None)
}

/// Step 4 of §4.B: subdirectories each containing a `layer.tar` member.
fn find_layer_only_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() && path.join("layer.tar").is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}
