//! The `child-init` sequence (spec §4.H): runs inside the freshly cloned,
//! namespaced process and ends by `execve`-ing into the container's
//! entrypoint. Never returns on success.

use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::mount::MsFlags;

use corral_oci::RunConfig;

use crate::error::{Error, Result};
use crate::mount;
use crate::sys;

const OLD_ROOT_DIR: &str = ".pivot_root";

/// Runs the full child-init sequence for the container whose persisted
/// `config.json` lives at `config_path`.
pub fn run(config_path: &Path) -> Result<()> {
    let config = read_run_config(config_path)?;
    // root.path is persisted relative to the store root (e.g. `_containers/<id>/rootfs`
    // when CORRAL_HOME is unset); pivot_root(2) resolves a relative new_root against
    // this process's cwd, so it must be made absolute first.
    let new_root = fs::canonicalize(&config.root.path).map_err(|e| Error::io(&config.root.path, e))?;

    if !config.hostname.is_empty() {
        sys::set_hostname(&config.hostname)?;
    }

    pivot(&new_root, config.root.readonly)?;

    mount::execute_mount_plan(Path::new("/"), &config.mounts)?;

    let cwd = if config.process.cwd.is_empty() {
        "/"
    } else {
        config.process.cwd.as_str()
    };
    env::set_current_dir(cwd).map_err(|e| Error::io(cwd, e))?;

    let program = resolve_executable(&config.process.args)?;
    let env_vars = merge_env(&config.process.env);

    Err(sys::exec(&program, &config.process.args, &env_vars))
}

fn read_run_config(path: &Path) -> Result<RunConfig> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::MalformedConfig {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Bind-mounts `new_root` onto itself, pivots, detaches the old root (left
/// at `<new_root>/.pivot_root`), and optionally remounts the new root
/// read-only.
fn pivot(new_root: &Path, readonly: bool) -> Result<()> {
    sys::bind_mount_self(new_root)?;

    let put_old = new_root.join(OLD_ROOT_DIR);
    fs::create_dir_all(&put_old).map_err(|e| Error::io(&put_old, e))?;
    fs::set_permissions(&put_old, fs::Permissions::from_mode(0o700))
        .map_err(|e| Error::io(&put_old, e))?;

    sys::do_pivot_root(new_root, &put_old)?;

    env::set_current_dir("/").map_err(|e| Error::io("/", e))?;

    if readonly {
        remount_root_readonly()?;
    }

    let old_root_after_pivot = Path::new("/").join(OLD_ROOT_DIR);
    if let Err(e) = sys::detach_and_remove_old_root(&old_root_after_pivot) {
        tracing::warn!("failed to clean up old root at {}: {e}", old_root_after_pivot.display());
    }

    Ok(())
}

fn remount_root_readonly() -> Result<()> {
    nix::mount::mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
        None::<&str>,
    )
    .map_err(|e| Error::MountFailed {
        target: PathBuf::from("/"),
        source: e,
    })
}

/// Inherited environment, with the image's configured environment appended
/// — config entries win on duplicate keys since they are applied last and
/// `execve` takes the literal list, not a merged map.
fn merge_env(config_env: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = env::vars().map(|(k, v)| format!("{k}={v}")).collect();
    merged.extend(config_env.iter().cloned());
    merged
}

/// Resolves `args[0]` to an executable path: absolute paths are used
/// as-is, relative names are searched on `$PATH`, and as a last resort
/// tried as `/<arg0>` against the new root — matching the original's
/// fallback for busybox-style single-binary images.
fn resolve_executable(args: &[String]) -> Result<PathBuf> {
    let arg0 = args.first().ok_or_else(|| Error::CommandNotFound(String::new()))?;
    let candidate = Path::new(arg0);

    if candidate.is_absolute() {
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(Error::CommandNotFound(arg0.clone()))
        };
    }

    if let Ok(path_var) = env::var("PATH") {
        for dir in path_var.split(':') {
            let full = Path::new(dir).join(arg0);
            if full.is_file() {
                return Ok(full);
            }
        }
    }

    let root_relative = Path::new("/").join(arg0);
    if root_relative.is_file() {
        return Ok(root_relative);
    }

    Err(Error::CommandNotFound(arg0.clone()))
}
