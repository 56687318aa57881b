//! Container lifecycle, namespace isolation, and mount setup for corral.
//!
//! Builds on [`corral_oci`] for image decoding; this crate owns everything
//! that happens once a rootfs and [`RunConfig`] exist: the on-disk
//! container store, the mount planner, the namespace spawner, and the
//! `child-init` sequence that runs inside the new namespaces.
//!
//! # Architecture
//!
//! ```text
//! ContainerStore::create(layers, RunConfig) -> id   (container.rs)
//!        |
//!        v
//! ContainerStore::start(id)                          (container.rs)
//!        |
//!        v
//! spawn::spawn_and_wait(id)    -- clone() into new namespaces  (spawn.rs)
//!        |
//!        v
//! childinit::run(config_path)  -- pivot_root, mount, execve    (childinit.rs)
//!        ^
//!        |
//! mount::execute_mount_plan                           (mount.rs)
//! ```

#![allow(clippy::missing_docs_in_private_items)]

mod childinit;
mod container;
mod error;
mod mount;
mod spawn;
mod sys;

pub use childinit::run as run_child_init;
pub use container::ContainerStore;
pub use error::{Error, Result};

pub use corral_oci::RunConfig;
