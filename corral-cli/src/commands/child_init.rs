//! `corral child-init <id>` — internal re-exec entry point, not for human
//! use. Reached only from inside the freshly cloned namespaces.

use crate::home::Home;

pub fn run(home: &Home, id: &str) -> anyhow::Result<()> {
    let store = corral::ContainerStore::new(&home.containers);
    let config_path = store.config_path(id)?;
    // Only returns here on failure; a successful run replaces this process.
    corral::run_child_init(&config_path)?;
    Ok(())
}
