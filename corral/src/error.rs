//! Error types for container lifecycle and isolation operations.

use std::path::PathBuf;

/// Alias for `Result<T, corral::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from container creation, mounting, namespace setup, and init.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Propagated from image resolution, decoding, or layer extraction.
    #[error(transparent)]
    Oci(#[from] corral_oci::Error),

    /// Filesystem I/O error. Carries the path that was being operated on.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path of the file or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// `config.json` failed to decode as a [`crate::RunConfig`].
    #[error("malformed run config at {path}: {source}")]
    MalformedConfig {
        /// Path of the offending `config.json`.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// No container exists with the given id.
    #[error("no such container: {0}")]
    NoSuchContainer(String),

    /// `mount(2)` (or a required remount) failed.
    #[error("mount of {target} failed: {source}")]
    MountFailed {
        /// Mount destination.
        target: PathBuf,
        /// Underlying syscall error.
        #[source]
        source: nix::Error,
    },

    /// `pivot_root(2)` or one of its surrounding bind-mount/chdir/cleanup
    /// steps failed.
    #[error("pivot_root failed: {0}")]
    PivotRootFailed(#[source] nix::Error),

    /// `sethostname(2)` failed.
    #[error("failed to set hostname: {0}")]
    HostnameFailed(#[source] nix::Error),

    /// `clone(2)` (namespace spawn) failed.
    #[error("failed to spawn namespaced child: {0}")]
    SpawnFailed(#[source] nix::Error),

    /// The resolved executable could not be found, neither as an absolute
    /// path, on `$PATH`, nor as `/<arg0>`.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// `execve(2)` returned — which for a successful exec never happens, so
    /// reaching this point is itself fatal.
    #[error("execve failed: {0}")]
    ExecFailed(#[source] nix::Error),

    /// The container's init process exited with a non-zero status or was
    /// killed by a signal.
    #[error("container {id} failed: {detail}")]
    ChildFailed {
        /// Container id.
        id: String,
        /// Human-readable description of the failure.
        detail: String,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
