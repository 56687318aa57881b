//! Directory-based container store: `_containers/<id>/{rootfs/,config.json}`.
//!
//! Mirrors the layout and persistence style of the teacher's `bux::state`
//! (JSON-on-disk, no database), generalized from one VM's state file to
//! many containers under a shared root.

use std::collections::hash_map::RandomState;
use std::fs;
use std::hash::{BuildHasher, Hasher};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use corral_oci::RunConfig;

use crate::error::{Error, Result};
use crate::spawn;

const CONFIG_FILE: &str = "config.json";
const ROOTFS_DIR: &str = "rootfs";
const MAX_ID_ATTEMPTS: u32 = 32;

/// A directory of containers, each its own subdirectory holding an
/// unpacked rootfs and a persisted `config.json`.
#[derive(Debug, Clone)]
pub struct ContainerStore {
    root: PathBuf,
}

impl ContainerStore {
    /// Opens (without requiring it to exist yet) the container store rooted
    /// at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Unpacks `layer_paths` into a freshly allocated container id's rootfs
    /// and persists `run_config` (with its `root.path` rewritten to point at
    /// that rootfs, and `hostname` defaulted to the id if the image left it
    /// empty) as `config.json`. Returns the new id.
    pub fn create(&self, layer_paths: &[PathBuf], mut run_config: RunConfig) -> Result<String> {
        let id = self.allocate_id()?;
        let container_dir = self.root.join(&id);
        let rootfs = container_dir.join(ROOTFS_DIR);
        fs::create_dir_all(&rootfs).map_err(|e| Error::io(&rootfs, e))?;

        corral_oci::unpack_layers(layer_paths, &rootfs)?;

        if run_config.hostname.is_empty() {
            run_config.hostname = id.clone();
        }
        run_config.root.path = rootfs.to_string_lossy().into_owned();

        let config_path = container_dir.join(CONFIG_FILE);
        let json = serde_json::to_vec_pretty(&run_config).map_err(|e| Error::MalformedConfig {
            path: config_path.clone(),
            source: e,
        })?;
        fs::write(&config_path, json).map_err(|e| Error::io(&config_path, e))?;

        Ok(id)
    }

    /// Path to `id`'s persisted `config.json`. Fails if the container does
    /// not exist.
    pub fn config_path(&self, id: &str) -> Result<PathBuf> {
        let path = self.root.join(id).join(CONFIG_FILE);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::NoSuchContainer(id.to_owned()))
        }
    }

    /// Lists every container id present in the store, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.root, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.root, e))?;
            if entry.path().join(CONFIG_FILE).is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_owned());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Removes a container's rootfs and config entirely.
    pub fn delete(&self, id: &str) -> Result<()> {
        let container_dir = self.root.join(id);
        if !container_dir.is_dir() {
            return Err(Error::NoSuchContainer(id.to_owned()));
        }
        fs::remove_dir_all(&container_dir).map_err(|e| Error::io(&container_dir, e))
    }

    /// Spawns `id` into fresh namespaces and blocks until it exits.
    pub fn start(&self, id: &str) -> Result<()> {
        self.config_path(id)?;
        spawn::spawn_and_wait(id)
    }

    /// The on-disk directory for `id`, regardless of whether it currently
    /// exists — used by the `child-init` subcommand to locate `config.json`
    /// after the spawner re-execs with only the id as an argument.
    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn allocate_id(&self) -> Result<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = gen_id();
            if !self.root.join(&candidate).exists() {
                return Ok(candidate);
            }
        }
        Err(Error::io(
            self.root.clone(),
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exhausted container id space"),
        ))
    }
}

/// Generates an 8 hex-character container id (spec-mandated length,
/// shorter than the teacher's 12-character convention). Entropy comes from
/// the process id and a monotonic timestamp hashed through `RandomState`,
/// the same source `bux::state::gen_id` uses.
fn gen_id() -> String {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u32(std::process::id());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    hasher.write_u128(nanos);
    format!("{:08x}", hasher.finish() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_oci::{ProcessConfig, RootConfig, UserIds};

    fn sample_run_config() -> RunConfig {
        RunConfig {
            oci_version: "1.0.2".into(),
            process: ProcessConfig {
                terminal: false,
                user: UserIds { uid: 0, gid: 0 },
                args: vec!["/bin/true".into()],
                env: Vec::new(),
                cwd: "/".into(),
            },
            hostname: String::new(),
            mounts: Vec::new(),
            root: RootConfig {
                path: String::new(),
                readonly: false,
            },
        }
    }

    #[test]
    fn list_on_missing_store_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(tmp.path().join("nope"));
        assert_eq!(store.list().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn create_persists_config_and_unpacks_empty_layer_set() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(tmp.path());

        let id = store.create(&[], sample_run_config()).unwrap();
        assert_eq!(id.len(), 8);

        let listed = store.list().unwrap();
        assert_eq!(listed, vec![id.clone()]);

        let config_path = store.config_path(&id).unwrap();
        let saved: RunConfig = serde_json::from_slice(&fs::read(config_path).unwrap()).unwrap();
        assert!(saved.root.path.ends_with("rootfs"));
    }

    #[test]
    fn create_defaults_empty_hostname_to_the_container_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(tmp.path());

        let id = store.create(&[], sample_run_config()).unwrap();

        let config_path = store.config_path(&id).unwrap();
        let saved: RunConfig = serde_json::from_slice(&fs::read(config_path).unwrap()).unwrap();
        assert_eq!(saved.hostname, id);
    }

    #[test]
    fn create_preserves_a_configured_hostname() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(tmp.path());

        let mut run_config = sample_run_config();
        run_config.hostname = "web".into();
        let id = store.create(&[], run_config).unwrap();

        let config_path = store.config_path(&id).unwrap();
        let saved: RunConfig = serde_json::from_slice(&fs::read(config_path).unwrap()).unwrap();
        assert_eq!(saved.hostname, "web");
    }

    #[test]
    fn delete_removes_container_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(tmp.path());
        let id = store.create(&[], sample_run_config()).unwrap();

        store.delete(&id).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn delete_unknown_id_is_no_such_container() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(tmp.path());
        assert!(matches!(store.delete("deadbeef"), Err(Error::NoSuchContainer(_))));
    }

    #[test]
    fn config_path_unknown_id_is_no_such_container() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(tmp.path());
        assert!(matches!(
            store.config_path("deadbeef"),
            Err(Error::NoSuchContainer(_))
        ));
    }

    #[test]
    fn gen_id_produces_eight_hex_characters() {
        let id = gen_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
