//! Resolves the `_images`/`_containers` store roots, honoring `CORRAL_HOME`
//! the way the teacher's runtimes let `BUX_HOME` override a working
//! directory-relative default.

use std::env;
use std::path::PathBuf;

/// The two store roots a `corral` invocation operates against.
#[derive(Debug, Clone)]
pub struct Home {
    /// `_images/<name>_<tag>/` — pulled image layouts.
    pub images: PathBuf,
    /// `_containers/<id>/` — unpacked rootfs and persisted config.
    pub containers: PathBuf,
}

/// Resolves `Home` from `CORRAL_HOME`, falling back to the current working
/// directory when unset.
pub fn resolve() -> Home {
    let base = env::var_os("CORRAL_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    Home {
        images: base.join("_images"),
        containers: base.join("_containers"),
    }
}
