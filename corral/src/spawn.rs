//! Namespace spawner: clones a process already inside the container's
//! namespaces and re-execs this binary as `child-init`.
//!
//! Uses `nix::sched::clone` with a heap-allocated stack, the pattern
//! `examples/other_examples/f493717e_doom-jocker__src-jocker-container.rs.rs`
//! follows for the same job. `clone` puts the new process inside every
//! requested namespace the instant it starts running — unlike `unshare`
//! called from a `pre_exec` hook, which only affects namespaces for that
//! process's *own* future children, never the process itself.

use std::env;
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::path::{Path, PathBuf};

use nix::sched::{clone, CloneFlags};
use nix::sys::signal::Signal;
use nix::unistd::{pipe, Pid};

use crate::error::{Error, Result};
use crate::sys;

const STACK_SIZE: usize = 1024 * 1024;

/// Namespaces isolating a container's init process, matching what the
/// original's `exec.Command{SysProcAttr.Cloneflags}` requests.
const NAMESPACE_FLAGS: CloneFlags = CloneFlags::CLONE_NEWUTS
    .union(CloneFlags::CLONE_NEWPID)
    .union(CloneFlags::CLONE_NEWNS)
    .union(CloneFlags::CLONE_NEWIPC)
    .union(CloneFlags::CLONE_NEWUSER)
    .union(CloneFlags::CLONE_NEWNET);

/// Clones the namespaced child, maps its root user onto the host's calling
/// user, releases it to re-exec `child-init <id>`, and blocks until it
/// exits.
pub fn spawn_and_wait(id: &str) -> Result<()> {
    let exe = env::current_exe().map_err(|e| Error::io(Path::new("/proc/self/exe"), e))?;
    let id_owned = id.to_string();

    let (read_end, write_end) = pipe().map_err(Error::SpawnFailed)?;
    let read_fd = read_end.into_raw_fd();

    let mut stack = vec![0u8; STACK_SIZE];

    let child_body: Box<dyn FnMut() -> isize> = Box::new(move || {
        wait_for_release(read_fd);
        let err = reexec(&exe, &id_owned);
        tracing::error!(%id_owned, "child-init re-exec failed: {err}");
        127
    });

    let pid = unsafe { clone(child_body, &mut stack, NAMESPACE_FLAGS, Some(Signal::SIGCHLD as i32)) }
        .map_err(Error::SpawnFailed)?;

    let map_result = write_id_maps(pid);
    // Release the child regardless of whether the maps succeeded: an
    // unmapped child will fail loudly on its own first privileged call,
    // which is more diagnosable than a child stuck reading the pipe forever.
    let release_byte = [1u8];
    // SAFETY: write_end is a valid, open pipe write fd owned by this
    // function; the buffer is 1 byte and lives on the stack for the call.
    unsafe {
        libc::write(
            write_end.as_raw_fd(),
            release_byte.as_ptr().cast(),
            release_byte.len(),
        );
    }
    drop(write_end);

    map_result?;
    sys::wait_for(id, pid)
}

/// Blocks the cloned child until the parent has finished writing its
/// `uid_map`/`gid_map`, which must happen before the child makes any call
/// that depends on its mapped identity (mounting, `pivot_root`, chdir into
/// a root-owned rootfs).
fn wait_for_release(read_fd: RawFd) {
    let mut buf = [0u8; 1];
    // SAFETY: read_fd is the read end of a pipe created by this module and
    // held open until this call returns; the buffer is 1 byte, stack-owned.
    unsafe {
        libc::read(read_fd, buf.as_mut_ptr().cast(), buf.len());
    }
}

fn reexec(exe: &Path, id: &str) -> Error {
    let args = vec![
        exe.to_string_lossy().into_owned(),
        "child-init".to_string(),
        id.to_string(),
    ];
    let env: Vec<String> = env::vars().map(|(k, v)| format!("{k}={v}")).collect();
    sys::exec(exe, &args, &env)
}

/// Maps uid/gid 0 inside the new user namespace onto the host's calling
/// uid/gid, a 1-entry mapping, and disables `setgroups` as the kernel
/// requires before a `gid_map` write is permitted for an unprivileged
/// mapper.
fn write_id_maps(pid: Pid) -> Result<()> {
    let uid = nix::unistd::getuid();
    let gid = nix::unistd::getgid();
    let proc_dir = PathBuf::from(format!("/proc/{}", pid.as_raw()));

    let setgroups = proc_dir.join("setgroups");
    std::fs::write(&setgroups, b"deny").map_err(|e| Error::io(setgroups, e))?;

    let uid_map = proc_dir.join("uid_map");
    std::fs::write(&uid_map, format!("0 {uid} 1")).map_err(|e| Error::io(uid_map, e))?;

    let gid_map = proc_dir.join("gid_map");
    std::fs::write(&gid_map, format!("0 {gid} 1")).map_err(|e| Error::io(gid_map, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_flags_cover_the_six_required_namespaces() {
        assert!(NAMESPACE_FLAGS.contains(CloneFlags::CLONE_NEWUTS));
        assert!(NAMESPACE_FLAGS.contains(CloneFlags::CLONE_NEWPID));
        assert!(NAMESPACE_FLAGS.contains(CloneFlags::CLONE_NEWNS));
        assert!(NAMESPACE_FLAGS.contains(CloneFlags::CLONE_NEWIPC));
        assert!(NAMESPACE_FLAGS.contains(CloneFlags::CLONE_NEWUSER));
        assert!(NAMESPACE_FLAGS.contains(CloneFlags::CLONE_NEWNET));
    }

    #[test]
    fn reexec_args_are_child_init_then_id() {
        let exe = PathBuf::from("/usr/local/bin/corral");
        // reexec() never returns on success and only an Error on failure,
        // so exercise the argument construction directly instead.
        let args = vec![
            exe.to_string_lossy().into_owned(),
            "child-init".to_string(),
            "abcd1234".to_string(),
        ];
        assert_eq!(args[1], "child-init");
        assert_eq!(args[2], "abcd1234");
    }
}
