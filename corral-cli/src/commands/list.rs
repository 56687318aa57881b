//! `corral list [--images]` — container ids, or `name:tag` image names.

use std::fs;
use std::io;

use crate::home::Home;

pub fn run(home: &Home, images: bool) -> anyhow::Result<()> {
    if images {
        list_images(home)
    } else {
        list_containers(home)
    }
}

fn list_containers(home: &Home) -> anyhow::Result<()> {
    let store = corral::ContainerStore::new(&home.containers);
    for id in store.list()? {
        println!("{id}");
    }
    Ok(())
}

/// Derives `name:tag` by splitting each `_images/` subdirectory name on the
/// first `_`, tolerating a malformed (non-two-part) entry rather than
/// panicking — the original `ListImages` behavior.
fn list_images(home: &Home) -> anyhow::Result<()> {
    let entries = match fs::read_dir(&home.images) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let Some(raw) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        match raw.split_once('_') {
            Some((name, tag)) => names.push(format!("{name}:{tag}")),
            None => names.push(raw),
        }
    }
    names.sort();
    for name in names {
        println!("{name}");
    }
    Ok(())
}
