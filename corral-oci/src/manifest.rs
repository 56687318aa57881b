//! Manifest and image-config decoding for each [`ImageLayout`] shape.
//!
//! Docker-save and OCI layouts are parsed into the same normalized
//! [`Manifest`]/[`ImageConfig`] pair, so everything downstream — the mapper in
//! `config.rs` and the unpacker in `extract.rs` — is layout-agnostic.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::layout::{ImageLayout, OciLayout};
use crate::{Error, Result};

/// A content descriptor: media type (when known) plus digest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Descriptor {
    /// Media type, e.g. `application/vnd.oci.image.layer.v1.tar+gzip`.
    #[serde(default, rename = "mediaType")]
    pub media_type: Option<String>,
    /// Canonical `"sha256:<hex>"` digest.
    pub digest: String,
}

/// A normalized image manifest: the config blob plus an ordered layer list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    /// OCI/Docker manifest schema version.
    #[serde(default = "default_schema_version", rename = "schemaVersion")]
    pub schema_version: u32,
    /// Descriptor of the image config blob.
    pub config: Descriptor,
    /// Descriptors of each layer, in application order.
    pub layers: Vec<Descriptor>,
}

fn default_schema_version() -> u32 {
    2
}

/// The normalized, layout-independent image configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ImageConfig {
    /// Target architecture, e.g. `amd64`.
    #[serde(default)]
    pub architecture: Option<String>,
    /// Target OS, e.g. `linux`.
    #[serde(default)]
    pub os: Option<String>,
    /// The nested runtime configuration block.
    #[serde(default)]
    pub config: ImageConfigInner,
}

/// The nested `config` block of an image config blob.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ImageConfigInner {
    /// `uid[:gid]` string, e.g. `"1000:1000"`.
    #[serde(default, rename = "User")]
    pub user: Option<String>,
    /// `KEY=VALUE` environment entries.
    #[serde(default, rename = "Env")]
    pub env: Option<Vec<String>>,
    /// Default command (`CMD`).
    #[serde(default, rename = "Cmd")]
    pub cmd: Option<Vec<String>>,
    /// Default entrypoint (`ENTRYPOINT`).
    #[serde(default, rename = "Entrypoint")]
    pub entrypoint: Option<Vec<String>>,
    /// Working directory (`WORKDIR`).
    #[serde(default, rename = "WorkingDir")]
    pub working_dir: Option<String>,
    /// Hostname, rarely set by image builders.
    #[serde(default, rename = "Hostname")]
    pub hostname: Option<String>,
}

/// Strips a `"sha256:"` prefix, if present, leaving the bare hex digest used
/// as an on-disk filename. Idempotent: a bare hex string passes through
/// unchanged.
pub fn digest_to_filename(digest: &str) -> String {
    digest
        .strip_prefix("sha256:")
        .map(str::to_owned)
        .unwrap_or_else(|| digest.to_owned())
}

/// Adds a `"sha256:"` prefix, if not already present, turning an on-disk
/// filename back into a canonical digest.
pub fn filename_to_digest(filename: &str) -> String {
    if filename.starts_with("sha256:") {
        filename.to_owned()
    } else {
        format!("sha256:{filename}")
    }
}

/// Reads and normalizes the manifest for an already-resolved [`ImageLayout`].
pub fn read_manifest(dir: &Path, layout: &ImageLayout) -> Result<Manifest> {
    match layout {
        ImageLayout::Oci(oci) => read_oci_manifest(dir, oci),
        ImageLayout::DockerSave {
            config_filename,
            layer_paths,
        } => Ok(synthesize_docker_manifest(config_filename, layer_paths)),
        ImageLayout::LayersOnly { layer_dirs } => Ok(synthesize_layers_only_manifest(layer_dirs)),
    }
}

fn read_oci_manifest(dir: &Path, oci: &OciLayout) -> Result<Manifest> {
    if let Some(config_filename) = &oci.degenerate_config_filename {
        let digest = filename_to_digest(
            config_filename
                .strip_suffix(".json")
                .unwrap_or(config_filename),
        );
        return Ok(Manifest {
            schema_version: default_schema_version(),
            config: Descriptor {
                media_type: None,
                digest,
            },
            layers: Vec::new(),
        });
    }

    let manifest_path = blob_path(dir, &oci.index_digest);
    let data = fs::read(&manifest_path).map_err(|e| Error::io(&manifest_path, e))?;
    serde_json::from_slice(&data).map_err(|e| Error::json(&manifest_path, e))
}

fn synthesize_docker_manifest(config_filename: &str, layer_paths: &[PathBuf]) -> Manifest {
    let config_digest = filename_to_digest(config_filename.strip_suffix(".json").unwrap_or(config_filename));

    let layers = layer_paths
        .iter()
        .map(|path| {
            let hex = if path.ends_with("layer.tar") {
                path.parent()
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_owned()
            } else {
                path.file_stem()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_owned()
            };
            Descriptor {
                media_type: Some("application/vnd.docker.image.rootfs.diff.tar".into()),
                digest: filename_to_digest(&hex),
            }
        })
        .collect();

    Manifest {
        schema_version: default_schema_version(),
        config: Descriptor {
            media_type: Some("application/vnd.docker.container.image.v1+json".into()),
            digest: config_digest,
        },
        layers,
    }
}

fn synthesize_layers_only_manifest(layer_dirs: &[PathBuf]) -> Manifest {
    let layers = layer_dirs
        .iter()
        .map(|dir| {
            let hex = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_owned();
            Descriptor {
                media_type: Some("application/vnd.oci.image.layer.v1.tar+gzip".into()),
                digest: filename_to_digest(&hex),
            }
        })
        .collect();

    Manifest {
        schema_version: default_schema_version(),
        config: Descriptor {
            media_type: None,
            digest: String::new(),
        },
        layers,
    }
}

/// Reads and normalizes the image config blob for an already-read [`Manifest`].
pub fn read_config(dir: &Path, layout: &ImageLayout, manifest: &Manifest) -> Result<ImageConfig> {
    match layout {
        ImageLayout::Oci(oci) => {
            if let Some(config_filename) = &oci.degenerate_config_filename {
                let path = dir.join(config_filename);
                return read_image_config(&path);
            }
            let path = blob_path(dir, &manifest.config.digest);
            read_image_config(&path)
        }
        ImageLayout::DockerSave {
            config_filename, ..
        } => read_image_config(&dir.join(config_filename)),
        ImageLayout::LayersOnly { .. } => Ok(ImageConfig {
            architecture: Some("amd64".into()),
            os: Some("linux".into()),
            config: ImageConfigInner {
                cmd: Some(vec!["/bin/sh".into()]),
                ..ImageConfigInner::default()
            },
        }),
    }
}

fn read_image_config(path: &Path) -> Result<ImageConfig> {
    let data = fs::read(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_slice(&data).map_err(|e| Error::json(path, e))
}

/// Resolves a canonical digest to its path under `blobs/sha256/`, failing if
/// the blob does not exist on disk.
fn blob_path(dir: &Path, digest: &str) -> PathBuf {
    dir.join("blobs").join("sha256").join(digest_to_filename(digest))
}

/// Resolves every layer descriptor in `manifest` to its on-disk tar file,
/// using `layout` to know where layer bytes actually live — `blobs/sha256/`
/// for OCI, `manifest.json`-listed paths for Docker-save, `<dir>/layer.tar`
/// for the layers-only fallback.
pub fn layer_paths(dir: &Path, layout: &ImageLayout, manifest: &Manifest) -> Result<Vec<PathBuf>> {
    match layout {
        ImageLayout::Oci(_) => manifest
            .layers
            .iter()
            .map(|descriptor| {
                let path = blob_path(dir, &descriptor.digest);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(Error::MissingBlob(path))
                }
            })
            .collect(),
        ImageLayout::DockerSave { layer_paths, .. } => Ok(layer_paths.clone()),
        ImageLayout::LayersOnly { layer_dirs } => {
            Ok(layer_dirs.iter().map(|d| d.join("layer.tar")).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn digest_filename_round_trip_from_canonical() {
        let hex = "a".repeat(64);
        let digest = format!("sha256:{hex}");
        assert_eq!(digest_to_filename(&digest), hex);
    }

    #[test]
    fn digest_filename_round_trip_from_bare() {
        let hex = "b".repeat(64);
        assert_eq!(digest_to_filename(&hex), hex);
        assert_eq!(filename_to_digest(&hex), format!("sha256:{hex}"));
    }

    #[test]
    fn filename_to_digest_is_idempotent_on_canonical_input() {
        let digest = format!("sha256:{}", "c".repeat(64));
        assert_eq!(filename_to_digest(&digest), digest);
    }

    #[test]
    fn reads_oci_manifest_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = dir.path().join("blobs/sha256");
        fs::create_dir_all(&blobs).unwrap();

        let config_hex = "d".repeat(64);
        fs::write(
            blobs.join(&config_hex),
            r#"{"architecture":"amd64","os":"linux","config":{"Cmd":["/bin/sh"]}}"#,
        )
        .unwrap();

        let manifest_hex = "e".repeat(64);
        fs::write(
            blobs.join(&manifest_hex),
            format!(
                r#"{{"schemaVersion":2,"config":{{"digest":"sha256:{config_hex}"}},"layers":[]}}"#
            ),
        )
        .unwrap();

        let layout = ImageLayout::Oci(OciLayout {
            index_digest: format!("sha256:{manifest_hex}"),
            degenerate_config_filename: None,
        });

        let manifest = read_manifest(dir.path(), &layout).unwrap();
        assert_eq!(manifest.config.digest, format!("sha256:{config_hex}"));

        let config = read_config(dir.path(), &layout, &manifest).unwrap();
        assert_eq!(config.config.cmd, Some(vec!["/bin/sh".into()]));
    }

    #[test]
    fn synthesizes_docker_save_manifest_from_layer_tar_parent_dirs() {
        let layer_paths = vec![PathBuf::from("/img/aaaa1111/layer.tar")];
        let manifest = synthesize_docker_manifest("config.json", &layer_paths);
        assert_eq!(manifest.layers[0].digest, "sha256:aaaa1111");
        assert_eq!(manifest.config.digest, "sha256:config");
    }

    #[test]
    fn synthesizes_layers_only_config_with_default_shell() {
        let layer_dirs = vec![PathBuf::from("/img/ffff2222")];
        let manifest = synthesize_layers_only_manifest(&layer_dirs);
        assert_eq!(manifest.layers[0].digest, "sha256:ffff2222");
    }

    #[test]
    fn layer_paths_for_docker_save_returns_manifest_paths_verbatim() {
        let layout = ImageLayout::DockerSave {
            config_filename: "abc.json".into(),
            layer_paths: vec![PathBuf::from("/img/l1/layer.tar")],
        };
        let manifest = synthesize_docker_manifest("abc.json", &[PathBuf::from("/img/l1/layer.tar")]);
        let paths = super::layer_paths(Path::new("/img"), &layout, &manifest).unwrap();
        assert_eq!(paths, vec![PathBuf::from("/img/l1/layer.tar")]);
    }

    #[test]
    fn layer_paths_for_layers_only_appends_layer_tar() {
        let layout = ImageLayout::LayersOnly {
            layer_dirs: vec![PathBuf::from("/img/ffff2222")],
        };
        let manifest = synthesize_layers_only_manifest(&[PathBuf::from("/img/ffff2222")]);
        let paths = super::layer_paths(Path::new("/img"), &layout, &manifest).unwrap();
        assert_eq!(paths, vec![PathBuf::from("/img/ffff2222/layer.tar")]);
    }

    #[test]
    fn layer_paths_for_oci_missing_blob_errors() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ImageLayout::Oci(OciLayout {
            index_digest: "sha256:whatever".into(),
            degenerate_config_filename: None,
        });
        let manifest = Manifest {
            schema_version: 2,
            config: Descriptor {
                media_type: None,
                digest: "sha256:missing".into(),
            },
            layers: vec![Descriptor {
                media_type: None,
                digest: format!("sha256:{}", "a".repeat(64)),
            }],
        };
        assert!(matches!(
            super::layer_paths(dir.path(), &layout, &manifest),
            Err(Error::MissingBlob(_))
        ));
    }
}
