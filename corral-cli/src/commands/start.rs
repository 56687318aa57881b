//! `corral start <id>` — re-run a container from its persisted config.

use crate::home::Home;

pub fn run(home: &Home, id: &str) -> anyhow::Result<()> {
    let store = corral::ContainerStore::new(&home.containers);
    store.start(id)?;
    Ok(())
}
