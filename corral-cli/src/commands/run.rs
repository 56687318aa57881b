//! `corral run <image> [cmd...]` — pull if missing, unpack, spawn.

use std::path::Path;

use anyhow::Context;
use corral_oci::{map_run_config, read_config, read_manifest, resolve_layout, ImageReference};

use crate::commands::image_store;
use crate::home::Home;

pub fn run(home: &Home, image: &str, cmd: &[String]) -> anyhow::Result<()> {
    let reference = ImageReference::parse(image);
    let image_dir = image_store::ensure_pulled(home, &reference)
        .with_context(|| format!("pulling {reference}"))?;

    let layout = resolve_layout(&image_dir)
        .with_context(|| format!("resolving layout of {reference}"))?;
    let manifest = read_manifest(&image_dir, &layout)
        .with_context(|| format!("reading manifest for {reference}"))?;
    let image_config = read_config(&image_dir, &layout, &manifest)
        .with_context(|| format!("reading config for {reference}"))?;
    let layers = corral_oci::layer_paths(&image_dir, &layout, &manifest)
        .with_context(|| format!("resolving layers for {reference}"))?;

    // The rootfs path is filled in by `ContainerStore::create` once an id is
    // allocated; this placeholder is never observed.
    let mut run_config = map_run_config(&image_config, Path::new(""))
        .with_context(|| format!("{reference} has no runnable entrypoint"))?;

    if !cmd.is_empty() {
        run_config.process.args = cmd.to_vec();
    }

    let store = corral::ContainerStore::new(&home.containers);
    let id = store
        .create(&layers, run_config)
        .with_context(|| format!("creating container from {reference}"))?;

    store
        .start(&id)
        .with_context(|| format!("running container {id}"))
}
