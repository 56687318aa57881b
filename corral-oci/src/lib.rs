//! OCI/Docker image handling for the corral container runtime.
//!
//! Resolves a pulled image directory into a normalized [`Manifest`] and
//! [`ImageConfig`], and unpacks its layers onto a rootfs. Knows nothing about
//! namespaces, mounting, or process spawning — see the `corral` crate for
//! that.
//!
//! # Architecture
//!
//! ```text
//! resolve_layout(dir) -> ImageLayout            (layout.rs)
//!        |
//!        v
//! read_manifest(dir, &layout) -> Manifest       (manifest.rs)
//! read_config(dir, &manifest) -> ImageConfig     |
//!        |
//!        v
//! map_run_config(&ImageConfig, rootfs) -> RunConfig   (config.rs)
//!        |
//!        v
//! unpack_layers(&[layer paths], rootfs)          (extract.rs)
//! ```

#![allow(clippy::missing_docs_in_private_items)]

mod config;
mod extract;
mod fetch;
mod layout;
mod manifest;
mod reference;

pub use config::{map_run_config, MountEntry, ProcessConfig, RootConfig, RunConfig, UserIds};
pub use extract::unpack_layers;
pub use fetch::ImageFetcher;
pub use layout::{resolve_layout, ImageLayout, OciLayout};
pub use manifest::{
    digest_to_filename, filename_to_digest, layer_paths, read_config, read_manifest, Descriptor,
    ImageConfig, ImageConfigInner, Manifest,
};
pub use reference::{normalized_name, parse_image_name, ImageReference};

/// Result type for `corral-oci` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from image resolution, decoding, and extraction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem I/O error. Carries the path that was being operated on.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path of the file or directory involved.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A manifest, index, or config blob failed to parse as JSON.
    #[error("malformed JSON at {path}: {source}")]
    Json {
        /// Path of the offending file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The image directory did not match any recognized layout.
    #[error("malformed image at {path}: {reason}")]
    MalformedImage {
        /// Image root directory.
        path: std::path::PathBuf,
        /// Human-readable explanation.
        reason: String,
    },

    /// A descriptor referenced a blob that does not exist on disk.
    #[error("missing blob: {0}")]
    MissingBlob(std::path::PathBuf),

    /// The image declares neither an entrypoint nor a command.
    #[error("image has no entrypoint or cmd, nothing to run")]
    UnrunnableImage,

    /// The `user` field in the image config is not a valid uid[:gid] pair.
    #[error("invalid user spec {0:?}: not numeric")]
    InvalidUser(String),

    /// A tar entry's path escapes the rootfs it is being unpacked into.
    #[error("path traversal in tar entry: {0}")]
    PathTraversal(String),
}

impl Error {
    fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    fn json(path: impl Into<std::path::PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
