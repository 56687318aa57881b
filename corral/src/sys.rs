//! Thin wrappers around the namespace/exec syscalls used by the spawner and
//! child-init sequence, translating `nix::Error` into [`crate::Error`].
//!
//! Mirrors the role the teacher's `bux::sys` plays for its FFI surface: one
//! place that turns raw syscall failures into this crate's error taxonomy,
//! kept separate from the sequencing logic in `spawn`/`childinit`.

use std::ffi::CString;
use std::path::Path;

use nix::mount::{mount, MsFlags};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{pivot_root, sethostname, Pid};

use crate::error::{Error, Result};

/// Bind-mounts `new_root` onto itself, privately and recursively, the
/// mandatory precondition for `pivot_root(2)` to treat it as a mount point.
pub fn bind_mount_self(new_root: &Path) -> Result<()> {
    mount(
        Some(new_root),
        new_root,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| Error::MountFailed {
        target: new_root.to_path_buf(),
        source: e,
    })
}

/// `pivot_root(new_root, put_old)`.
pub fn do_pivot_root(new_root: &Path, put_old: &Path) -> Result<()> {
    pivot_root(new_root, put_old).map_err(Error::PivotRootFailed)
}

/// Lazily unmounts and removes the old root, left behind at `put_old` after
/// `pivot_root`. Failures here are the caller's to treat as warnings, not
/// propagate as fatal — the container is already running inside its new
/// root regardless of whether this cleanup succeeds.
pub fn detach_and_remove_old_root(put_old: &Path) -> std::io::Result<()> {
    nix::mount::umount2(put_old, nix::mount::MntFlags::MNT_DETACH)
        .map_err(std::io::Error::from)?;
    std::fs::remove_dir(put_old)
}

/// `sethostname(2)`.
pub fn set_hostname(hostname: &str) -> Result<()> {
    sethostname(hostname).map_err(Error::HostnameFailed)
}

/// Replaces the current process image. Only returns on failure — a
/// successful `execve` never returns control to the caller.
pub fn exec(path: &Path, args: &[String], env: &[String]) -> Error {
    let path_c = match CString::new(path.as_os_str().as_encoded_bytes()) {
        Ok(c) => c,
        Err(_) => return Error::CommandNotFound(path.display().to_string()),
    };
    let args_c: Vec<CString> = match args.iter().map(|a| CString::new(a.as_str())).collect() {
        Ok(v) => v,
        Err(_) => return Error::CommandNotFound(path.display().to_string()),
    };
    let env_c: Vec<CString> = match env.iter().map(|e| CString::new(e.as_str())).collect() {
        Ok(v) => v,
        Err(_) => return Error::CommandNotFound(path.display().to_string()),
    };

    match nix::unistd::execve(&path_c, &args_c, &env_c) {
        Ok(infallible) => match infallible {},
        Err(e) => Error::ExecFailed(e),
    }
}

/// Blocks until `pid` exits, translating the result into a `Result<()>`
/// whose `Err` carries the human-readable failure detail spec.md §7 asks
/// for on non-zero exit or signal death.
pub fn wait_for(id: &str, pid: Pid) -> Result<()> {
    match waitpid(pid, None).map_err(Error::SpawnFailed)? {
        WaitStatus::Exited(_, 0) => Ok(()),
        WaitStatus::Exited(_, code) => Err(Error::ChildFailed {
            id: id.to_string(),
            detail: format!("exited with status {code}"),
        }),
        WaitStatus::Signaled(_, signal, _) => Err(Error::ChildFailed {
            id: id.to_string(),
            detail: format!("killed by signal {signal}"),
        }),
        other => Err(Error::ChildFailed {
            id: id.to_string(),
            detail: format!("unexpected wait status: {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_rejects_nul_bytes_in_path_as_command_not_found() {
        let bad = Path::new("/bin/\0sh");
        let err = exec(bad, &[], &[]);
        assert!(matches!(err, Error::CommandNotFound(_)));
    }
}
