//! `corral rm <id> [<id>...]` — remove each, continuing on per-id errors.

use crate::home::Home;

pub fn run(home: &Home, ids: &[String]) -> anyhow::Result<()> {
    let store = corral::ContainerStore::new(&home.containers);

    let mut failed = false;
    for id in ids {
        if let Err(e) = store.delete(id) {
            eprintln!("corral: rm {id}: {e}");
            failed = true;
        }
    }

    if failed {
        anyhow::bail!("one or more containers could not be removed");
    }
    Ok(())
}
