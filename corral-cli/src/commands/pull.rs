//! `corral pull <image>` — populate the image store only.

use anyhow::Context;
use corral_oci::ImageReference;

use crate::commands::image_store;
use crate::home::Home;

pub fn run(home: &Home, image: &str) -> anyhow::Result<()> {
    let reference = ImageReference::parse(image);
    let dir = image_store::ensure_pulled(home, &reference)
        .with_context(|| format!("pulling {reference}"))?;
    println!("{}", dir.display());
    Ok(())
}
