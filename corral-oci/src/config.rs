//! The persisted per-container `config.json` shape, and the pure mapping
//! function from a decoded [`ImageConfig`] to it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::manifest::ImageConfig;
use crate::{Error, Result};

/// Current OCI runtime-spec version this crate writes into `config.json`.
const OCI_VERSION: &str = "1.0.2";

/// The runtime configuration persisted as `_containers/<id>/config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// OCI runtime-spec version.
    #[serde(rename = "ociVersion")]
    pub oci_version: String,
    /// The process to execute inside the container.
    pub process: ProcessConfig,
    /// Container hostname. Empty means "use the container id".
    pub hostname: String,
    /// Mounts to perform after `pivot_root`, in order.
    #[serde(default)]
    pub mounts: Vec<MountEntry>,
    /// The rootfs this container executes against.
    pub root: RootConfig,
}

/// The process to launch, and the identity it runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Whether a controlling terminal should be attached. corral never sets
    /// this; it is carried through for runtime-spec compatibility.
    #[serde(default)]
    pub terminal: bool,
    /// Numeric uid/gid the process runs as inside the container.
    pub user: UserIds,
    /// Argv, with entrypoint merged ahead of cmd per spec.
    pub args: Vec<String>,
    /// Process environment, to be merged with the inherited environment at
    /// child-init time.
    #[serde(default)]
    pub env: Vec<String>,
    /// Working directory, always non-empty (`"/"` when the image left it blank).
    pub cwd: String,
}

/// A numeric uid/gid pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIds {
    /// User id inside the container's user namespace.
    pub uid: u32,
    /// Group id inside the container's user namespace.
    pub gid: u32,
}

/// A single mount to perform, matching the runtime-spec mount entry shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    /// Destination path, relative to the new root.
    pub destination: String,
    /// Source path or pseudo-filesystem name (`proc`, `sysfs`, ...).
    pub source: String,
    /// Filesystem type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Mount option tokens, translated to flags by the mount planner.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// The rootfs this container's process runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    /// Absolute path to the unpacked rootfs directory.
    pub path: String,
    /// Whether the rootfs should be mounted (bind-remounted) read-only.
    #[serde(default)]
    pub readonly: bool,
}

/// Maps a decoded [`ImageConfig`] and the rootfs it was unpacked into to a
/// [`RunConfig`], per spec §4.D.
///
/// Fails with [`Error::UnrunnableImage`] if neither `entrypoint` nor `cmd` is
/// present, and with [`Error::InvalidUser`] if the `user` field's uid or gid
/// half is non-empty and non-numeric.
pub fn map_run_config(config: &ImageConfig, rootfs_path: &Path) -> Result<RunConfig> {
    let inner = &config.config;

    let args = match &inner.entrypoint {
        Some(entrypoint) if !entrypoint.is_empty() => {
            let mut args = entrypoint.clone();
            if let Some(cmd) = &inner.cmd {
                args.extend(cmd.iter().cloned());
            }
            args
        }
        _ => inner.cmd.clone().unwrap_or_default(),
    };

    if args.is_empty() {
        return Err(Error::UnrunnableImage);
    }

    let user = parse_user(inner.user.as_deref().unwrap_or(""))?;

    let mut cwd = inner.working_dir.clone().unwrap_or_default();
    if cwd.is_empty() {
        cwd = "/".to_owned();
    }

    Ok(RunConfig {
        oci_version: OCI_VERSION.to_owned(),
        process: ProcessConfig {
            terminal: false,
            user,
            args,
            env: inner.env.clone().unwrap_or_default(),
            cwd,
        },
        hostname: inner.hostname.clone().unwrap_or_default(),
        mounts: Vec::new(),
        root: RootConfig {
            path: rootfs_path.to_string_lossy().into_owned(),
            readonly: false,
        },
    })
}

/// Parses the image config `user` field: `"uid:gid"`, `"uid"`, or `""`.
///
/// Mirrors the original `parseIntOrDefault` semantics exactly: an empty half
/// defaults to `0`, a missing gid half copies the uid, and a non-empty,
/// non-numeric half is an error.
fn parse_user(user: &str) -> Result<UserIds> {
    if user.is_empty() {
        return Ok(UserIds { uid: 0, gid: 0 });
    }

    let mut parts = user.splitn(2, ':');
    let uid_part = parts.next().unwrap_or("");
    let gid_part = parts.next();

    let uid = parse_int_or_default(uid_part, user)?;
    let gid = match gid_part {
        Some(g) => parse_int_or_default(g, user)?,
        None => uid,
    };

    Ok(UserIds { uid, gid })
}

fn parse_int_or_default(s: &str, whole: &str) -> Result<u32> {
    if s.is_empty() {
        return Ok(0);
    }
    s.parse::<u32>()
        .map_err(|_| Error::InvalidUser(whole.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ImageConfigInner;

    fn config_with(inner: ImageConfigInner) -> ImageConfig {
        ImageConfig {
            architecture: None,
            os: None,
            config: inner,
        }
    }

    #[test]
    fn merges_entrypoint_and_cmd() {
        let cfg = config_with(ImageConfigInner {
            entrypoint: Some(vec!["/bin/sh".into(), "-c".into()]),
            cmd: Some(vec!["echo a".into()]),
            ..Default::default()
        });
        let run = map_run_config(&cfg, Path::new("/rootfs")).unwrap();
        assert_eq!(run.process.args, vec!["/bin/sh", "-c", "echo a"]);
    }

    #[test]
    fn cmd_only_when_no_entrypoint() {
        let cfg = config_with(ImageConfigInner {
            cmd: Some(vec!["/bin/true".into()]),
            ..Default::default()
        });
        let run = map_run_config(&cfg, Path::new("/rootfs")).unwrap();
        assert_eq!(run.process.args, vec!["/bin/true"]);
    }

    #[test]
    fn empty_args_is_unrunnable() {
        let cfg = config_with(ImageConfigInner::default());
        assert!(matches!(
            map_run_config(&cfg, Path::new("/rootfs")),
            Err(Error::UnrunnableImage)
        ));
    }

    #[test]
    fn user_field_with_both_halves() {
        assert_eq!(
            parse_user("1000:2000").unwrap(),
            UserIds { uid: 1000, gid: 2000 }
        );
    }

    #[test]
    fn user_field_with_uid_only_copies_to_gid() {
        assert_eq!(parse_user("1000").unwrap(), UserIds { uid: 1000, gid: 1000 });
    }

    #[test]
    fn user_field_empty_defaults_to_root() {
        assert_eq!(parse_user("").unwrap(), UserIds { uid: 0, gid: 0 });
    }

    #[test]
    fn user_field_empty_gid_half_defaults_to_zero() {
        assert_eq!(parse_user("1000:").unwrap(), UserIds { uid: 1000, gid: 0 });
    }

    #[test]
    fn non_numeric_user_is_invalid() {
        assert!(matches!(parse_user("notanumber"), Err(Error::InvalidUser(_))));
        assert!(matches!(parse_user("1000:notanumber"), Err(Error::InvalidUser(_))));
    }

    #[test]
    fn blank_working_dir_defaults_to_root_slash() {
        let cfg = config_with(ImageConfigInner {
            cmd: Some(vec!["/bin/true".into()]),
            ..Default::default()
        });
        let run = map_run_config(&cfg, Path::new("/rootfs")).unwrap();
        assert_eq!(run.process.cwd, "/");
    }
}
