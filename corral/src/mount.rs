//! Mount option translation and the mount plan executor.
//!
//! Runs inside the child, after `pivot_root`. The option-to-flag translation
//! is a flat data table (spec §9 "option table as data"), not a hand-rolled
//! branch chain.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use nix::mount::{mount, MsFlags};

use corral_oci::MountEntry;

use crate::error::{Error, Result};

type OptionEffect = fn(MsFlags) -> MsFlags;

/// The full mount-option vocabulary (spec §6), mapped to its effect on the
/// flag mask. Any token not in this table is forwarded verbatim as part of
/// the mount's comma-joined `data` string.
const OPTION_TABLE: &[(&str, OptionEffect)] = &[
    ("ro", |f| f | MsFlags::MS_RDONLY),
    ("nosuid", |f| f | MsFlags::MS_NOSUID),
    ("suid", |f| f & !MsFlags::MS_NOSUID),
    ("nodev", |f| f | MsFlags::MS_NODEV),
    ("dev", |f| f & !MsFlags::MS_NODEV),
    ("noexec", |f| f | MsFlags::MS_NOEXEC),
    ("exec", |f| f & !MsFlags::MS_NOEXEC),
    ("sync", |f| f | MsFlags::MS_SYNCHRONOUS),
    ("async", |f| f & !MsFlags::MS_SYNCHRONOUS),
    ("dirsync", |f| f | MsFlags::MS_DIRSYNC),
    ("remount", |f| f | MsFlags::MS_REMOUNT),
    ("mand", |f| f | MsFlags::MS_MANDLOCK),
    ("nomand", |f| f & !MsFlags::MS_MANDLOCK),
    ("atime", |f| f & !MsFlags::MS_NOATIME),
    ("noatime", |f| f | MsFlags::MS_NOATIME),
    ("relatime", |f| (f & !MsFlags::MS_NOATIME) | MsFlags::MS_RELATIME),
    ("norelatime", |f| f & !MsFlags::MS_RELATIME),
    ("strictatime", |f| {
        (f & !(MsFlags::MS_NOATIME | MsFlags::MS_RELATIME)) | MsFlags::MS_STRICTATIME
    }),
    ("nostrictatime", |f| f & !MsFlags::MS_STRICTATIME),
    ("bind", |f| f | MsFlags::MS_BIND),
    ("rbind", |f| f | MsFlags::MS_BIND | MsFlags::MS_REC),
    ("private", |f| f | MsFlags::MS_PRIVATE),
    ("rprivate", |f| f | MsFlags::MS_PRIVATE | MsFlags::MS_REC),
    ("slave", |f| f | MsFlags::MS_SLAVE),
    ("rslave", |f| f | MsFlags::MS_SLAVE | MsFlags::MS_REC),
    ("shared", |f| f | MsFlags::MS_SHARED),
    ("rshared", |f| f | MsFlags::MS_SHARED | MsFlags::MS_REC),
    ("unbindable", |f| f | MsFlags::MS_UNBINDABLE),
    ("runbindable", |f| f | MsFlags::MS_UNBINDABLE | MsFlags::MS_REC),
];

/// Translates a mount's option tokens into a flag mask plus an optional
/// verbatim `data` string for tokens the table does not recognize.
///
/// Every mount starts from `NOSUID|NODEV`; options layer on top.
fn translate_options(options: &[String]) -> (MsFlags, Option<String>) {
    let mut flags = MsFlags::MS_NOSUID | MsFlags::MS_NODEV;
    let mut passthrough = Vec::new();

    for opt in options {
        match OPTION_TABLE.iter().find(|(name, _)| *name == opt) {
            Some((_, effect)) => flags = effect(flags),
            None => passthrough.push(opt.clone()),
        }
    }

    let data = (!passthrough.is_empty()).then(|| passthrough.join(","));
    (flags, data)
}

/// The four mounts always performed first, ahead of any user mount, and
/// never de-duplicated against them.
fn standard_mounts() -> Vec<MountEntry> {
    vec![
        MountEntry {
            destination: "/proc".into(),
            source: "proc".into(),
            kind: "proc".into(),
            options: Vec::new(),
        },
        MountEntry {
            destination: "/sys".into(),
            source: "sysfs".into(),
            kind: "sysfs".into(),
            options: Vec::new(),
        },
        MountEntry {
            destination: "/dev".into(),
            source: "tmpfs".into(),
            kind: "tmpfs".into(),
            options: vec![
                "nosuid".into(),
                "strictatime".into(),
                "mode=755".into(),
                "size=65536k".into(),
            ],
        },
        MountEntry {
            destination: "/dev/pts".into(),
            source: "devpts".into(),
            kind: "devpts".into(),
            options: vec![
                "nosuid".into(),
                "noexec".into(),
                "newinstance".into(),
                "ptmxmode=0666".into(),
                "mode=0620".into(),
            ],
        },
    ]
}

/// Executes the full mount plan — standard mounts, then `user_mounts` in
/// config order — relative to `new_root`.
pub fn execute_mount_plan(new_root: &Path, user_mounts: &[MountEntry]) -> Result<()> {
    for entry in standard_mounts().iter().chain(user_mounts.iter()) {
        execute_mount(new_root, entry)?;
    }
    Ok(())
}

fn execute_mount(new_root: &Path, entry: &MountEntry) -> Result<()> {
    let dest = join_under_root(new_root, &entry.destination);
    let (flags, data) = translate_options(&entry.options);

    if flags.contains(MsFlags::MS_BIND) {
        prepare_bind_target(&entry.source, &dest)?;
    } else {
        fs::create_dir_all(&dest).map_err(|e| Error::io(&dest, e))?;
    }

    let source = (!entry.source.is_empty()).then_some(entry.source.as_str());
    let fstype = (!entry.kind.is_empty()).then_some(entry.kind.as_str());

    mount(source, &dest, fstype, flags, data.as_deref()).map_err(|e| Error::MountFailed {
        target: dest.clone(),
        source: e,
    })?;

    if flags.contains(MsFlags::MS_BIND) && flags.contains(MsFlags::MS_RDONLY) {
        remount_readonly(&dest, flags)?;
    }

    Ok(())
}

/// Linux ignores `MS_RDONLY` on the initial bind mount call; a read-only
/// bind mount always requires this follow-up remount.
fn remount_readonly(dest: &Path, original_flags: MsFlags) -> Result<()> {
    let propagated = original_flags & (MsFlags::MS_NOEXEC | MsFlags::MS_NODEV | MsFlags::MS_NOSUID);
    let remount_flags = MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY | propagated;

    mount(
        None::<&str>,
        dest,
        None::<&str>,
        remount_flags,
        None::<&str>,
    )
    .map_err(|e| Error::MountFailed {
        target: dest.to_path_buf(),
        source: e,
    })
}

/// Joins a mount destination (always given as an absolute path, e.g.
/// `/proc`) onto `new_root` without producing a doubled separator when
/// `new_root` is itself `/` (spec §9's `setupMounts` join bug).
///
/// `Path::join` replaces its receiver outright when given an absolute
/// second argument, so the destination is stripped of its leading slash
/// before joining rather than joined as-is.
fn join_under_root(new_root: &Path, destination: &str) -> PathBuf {
    let relative = destination.trim_start_matches('/');
    if relative.is_empty() {
        new_root.to_path_buf()
    } else {
        new_root.join(relative)
    }
}

/// Ensures a bind mount has a same-kind target: the source must already
/// exist; a directory source gets a directory target, anything else gets an
/// empty placeholder file.
fn prepare_bind_target(source: &str, dest: &Path) -> Result<()> {
    let source_path = Path::new(source);
    let meta = fs::metadata(source_path).map_err(|e| Error::io(source_path, e))?;

    if meta.is_dir() {
        fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .open(dest)
            .map_err(|e| Error::io(dest, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_flags_are_nosuid_and_nodev() {
        let (flags, data) = translate_options(&[]);
        assert_eq!(flags, MsFlags::MS_NOSUID | MsFlags::MS_NODEV);
        assert_eq!(data, None);
    }

    #[test]
    fn ro_sets_rdonly() {
        let (flags, _) = translate_options(&["ro".into()]);
        assert!(flags.contains(MsFlags::MS_RDONLY));
    }

    #[test]
    fn suid_clears_nosuid_default() {
        let (flags, _) = translate_options(&["suid".into()]);
        assert!(!flags.contains(MsFlags::MS_NOSUID));
    }

    #[test]
    fn rbind_sets_bind_and_rec() {
        let (flags, _) = translate_options(&["rbind".into()]);
        assert!(flags.contains(MsFlags::MS_BIND));
        assert!(flags.contains(MsFlags::MS_REC));
    }

    #[test]
    fn unrecognized_tokens_become_passthrough_data() {
        let (_, data) = translate_options(&["size=64m".into(), "mode=0755".into()]);
        assert_eq!(data, Some("size=64m,mode=0755".into()));
    }

    #[test]
    fn join_under_root_handles_root_slash_without_double_separator() {
        let joined = join_under_root(Path::new("/"), "/proc");
        assert_eq!(joined, PathBuf::from("/proc"));
    }

    #[test]
    fn join_under_root_handles_nested_root() {
        let joined = join_under_root(Path::new("/mnt/rootfs"), "/dev/pts");
        assert_eq!(joined, PathBuf::from("/mnt/rootfs/dev/pts"));
    }

    #[test]
    fn standard_mounts_are_in_proc_sys_dev_devpts_order() {
        let mounts = standard_mounts();
        let destinations: Vec<&str> = mounts.iter().map(|m| m.destination.as_str()).collect();
        assert_eq!(destinations, ["/proc", "/sys", "/dev", "/dev/pts"]);
    }

    #[test]
    fn prepare_bind_target_rejects_missing_source() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("dest");
        let err = prepare_bind_target("/no/such/source", &dest).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn prepare_bind_target_creates_placeholder_file_for_file_source() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source_file");
        fs::write(&source, b"x").unwrap();
        let dest = tmp.path().join("nested/dest_file");

        prepare_bind_target(source.to_str().unwrap(), &dest).unwrap();
        assert!(dest.is_file());
    }
}
