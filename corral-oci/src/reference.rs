//! Image reference parsing: `name[:tag]`.
//!
//! Unlike a full registry reference parser (see `bux-oci::reference` for
//! that shape), corral images are addressed purely by the local image store
//! convention: a bare `name` or `name:tag` string, with no registry host or
//! digest form. The registry side lives entirely behind [`crate::ImageFetcher`].

use std::fmt;

const DEFAULT_TAG: &str = "latest";

/// A parsed local image reference: `(name, tag)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Image name, e.g. `alpine`.
    pub name: String,
    /// Tag, defaulting to `latest` when omitted.
    pub tag: String,
}

impl ImageReference {
    /// Parses `"name[:tag]"`. Never fails — an empty tag defaults to `latest`.
    pub fn parse(input: &str) -> Self {
        let (name, tag) = parse_image_name(input);
        Self { name, tag }
    }

    /// Returns the on-disk directory name: `"{name}_{tag}"`.
    pub fn normalized(&self) -> String {
        normalized_name(&self.name, &self.tag)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Splits `"name[:tag]"` into `(name, tag)`, defaulting the tag to `latest`.
///
/// Mirrors the original `strings.Split(name, ":")` behavior exactly: a third
/// colon-separated segment (if any) is silently dropped rather than folded
/// into the tag.
pub fn parse_image_name(input: &str) -> (String, String) {
    let parts: Vec<&str> = input.split(':').collect();
    match parts.as_slice() {
        [name] => ((*name).to_owned(), DEFAULT_TAG.to_owned()),
        [name, tag, ..] => ((*name).to_owned(), (*tag).to_owned()),
        [] => (String::new(), DEFAULT_TAG.to_owned()),
    }
}

/// Builds the on-disk normalized form `"{name}_{tag}"` for an image.
pub fn normalized_name(name: &str, tag: &str) -> String {
    format!("{name}_{tag}")
}
