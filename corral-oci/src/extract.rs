//! Layer unpacking: streams ordered tar(+gzip) layers onto a rootfs tree.
//!
//! Later layers overwrite earlier ones. Whiteouts (`.wh.X`) remove a path
//! left by an earlier layer; the opaque whiteout (`.wh..wh..opq`) is a known
//! gap (see spec §9) and is silently ignored rather than acted on.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";
const WHITEOUT_PREFIX: &str = ".wh.";

/// Unpacks each layer in `layer_paths`, in order, onto `rootfs`.
///
/// Creates `rootfs` if it does not already exist. Any structural failure
/// (bad header, path traversal, I/O error writing a file) aborts the whole
/// operation; the caller is responsible for removing a partially built
/// rootfs. Per-entry warnings (failed chmod, failed whiteout removal,
/// unsupported entry type) are logged and do not abort.
pub fn unpack_layers(layer_paths: &[PathBuf], rootfs: &Path) -> Result<()> {
    fs::create_dir_all(rootfs).map_err(|e| Error::io(rootfs, e))?;

    for layer_path in layer_paths {
        unpack_layer(layer_path, rootfs)?;
    }

    Ok(())
}

fn unpack_layer(layer_path: &Path, rootfs: &Path) -> Result<()> {
    let reader = open_layer_reader(layer_path)?;
    let mut archive = Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| Error::io(layer_path, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::io(layer_path, e))?;
        let name = entry
            .path()
            .map_err(|e| Error::io(layer_path, e))?
            .into_owned();

        let target = clean_join(rootfs, &name);
        if !target.starts_with(rootfs) {
            return Err(Error::PathTraversal(name.display().to_string()));
        }

        let basename = name
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if basename == OPAQUE_WHITEOUT {
            continue;
        }

        if let Some(stripped) = basename.strip_prefix(WHITEOUT_PREFIX) {
            let victim = target
                .parent()
                .map(|p| p.join(stripped))
                .unwrap_or_else(|| target.clone());
            if let Err(e) = remove_path(&victim) {
                tracing::warn!(path = %victim.display(), error = %e, "failed to remove whiteout path");
            }
            continue;
        }

        let entry_type = entry.header().entry_type();
        match entry_type {
            EntryType::Directory => unpack_dir(&mut entry, &target)?,
            EntryType::Regular => unpack_regular(&mut entry, &target)?,
            EntryType::Symlink => unpack_symlink(&mut entry, &target)?,
            EntryType::Link => unpack_hardlink(&mut entry, &target, rootfs)?,
            other => {
                tracing::warn!(?other, path = %name.display(), "unsupported tar entry type, skipping");
                continue;
            }
        }

        apply_timestamps(&mut entry, &target);
    }

    Ok(())
}

/// Opens `path`, sniffing the first two bytes for the gzip magic so both
/// compressed OCI/Docker layers and plain `docker save` `layer.tar` files
/// unpack through the same code path.
fn open_layer_reader(path: &Path) -> Result<Box<dyn Read>> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic).map_err(|e| Error::io(path, e))?;
    file.seek(SeekFrom::Start(0)).map_err(|e| Error::io(path, e))?;

    if read == 2 && magic == GZIP_MAGIC {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Joins `name` onto `dest`, lexically resolving `.`/`..` components the way
/// `filepath.Clean(filepath.Join(...))` does, so a traversal attempt cannot
/// hide behind a literal `..` that `Path::join` would otherwise preserve
/// verbatim.
fn clean_join(dest: &Path, name: &Path) -> PathBuf {
    let mut result = dest.to_path_buf();
    for component in name.components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    result
}

fn unpack_dir(entry: &mut tar::Entry<'_, Box<dyn Read>>, target: &Path) -> Result<()> {
    let mode = entry.header().mode().unwrap_or(0o755);
    fs::create_dir_all(target).map_err(|e| Error::io(target, e))?;
    if let Err(e) = fs::set_permissions(target, fs::Permissions::from_mode(mode)) {
        tracing::warn!(path = %target.display(), error = %e, "failed to chmod directory");
    }
    Ok(())
}

fn unpack_regular(entry: &mut tar::Entry<'_, Box<dyn Read>>, target: &Path) -> Result<()> {
    let mode = entry.header().mode().unwrap_or(0o644);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(mode)
        .open(target)
        .map_err(|e| Error::io(target, e))?;

    io::copy(entry, &mut file).map_err(|e| Error::io(target, e))?;
    drop(file);

    if let Err(e) = fs::set_permissions(target, fs::Permissions::from_mode(mode)) {
        tracing::warn!(path = %target.display(), error = %e, "failed to chmod file");
    }
    Ok(())
}

fn unpack_symlink(entry: &mut tar::Entry<'_, Box<dyn Read>>, target: &Path) -> Result<()> {
    let link_name = entry
        .header()
        .link_name()
        .map_err(|e| Error::io(target, e))?
        .ok_or_else(|| Error::MalformedImage {
            path: target.to_path_buf(),
            reason: "symlink entry has no link name".into(),
        })?
        .into_owned();

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    if fs::symlink_metadata(target).is_ok() {
        let _ = fs::remove_file(target);
    }
    symlink(&link_name, target).map_err(|e| Error::io(target, e))?;
    Ok(())
}

fn unpack_hardlink(
    entry: &mut tar::Entry<'_, Box<dyn Read>>,
    target: &Path,
    rootfs: &Path,
) -> Result<()> {
    let link_name = entry
        .header()
        .link_name()
        .map_err(|e| Error::io(target, e))?
        .ok_or_else(|| Error::MalformedImage {
            path: target.to_path_buf(),
            reason: "hardlink entry has no link name".into(),
        })?
        .into_owned();

    let source = clean_join(rootfs, &link_name);

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    if fs::symlink_metadata(target).is_ok() {
        let _ = fs::remove_file(target);
    }
    fs::hard_link(&source, target).map_err(|e| Error::io(target, e))?;
    Ok(())
}

/// Best-effort application of the tar header's access/modification times.
/// GNU tar headers carry an `atime`; when absent we fall back to `mtime`.
fn apply_timestamps(entry: &mut tar::Entry<'_, Box<dyn Read>>, target: &Path) {
    let header = entry.header();
    let Ok(mtime) = header.mtime() else {
        return;
    };
    let atime = header
        .as_gnu()
        .and_then(|gnu| gnu.atime().ok())
        .unwrap_or(mtime);

    let mtime = nix::sys::time::TimeVal::new(mtime as i64, 0);
    let atime = nix::sys::time::TimeVal::new(atime as i64, 0);

    if let Err(e) = nix::sys::stat::utimes(target, &atime, &mtime) {
        tracing::warn!(path = %target.display(), error = %e, "failed to apply timestamps");
    }
}

/// Removes a whiteout victim regardless of whether it is a file or directory.
fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_layer(dir: &Path, name: &str, entries: impl FnOnce(&mut tar::Builder<File>)) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let mut builder = tar::Builder::new(file);
        entries(&mut builder);
        builder.finish().unwrap();
        path
    }

    fn append_file<W: Write>(builder: &mut tar::Builder<W>, path: &str, contents: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append_data(&mut header, path, contents).unwrap();
    }

    fn append_whiteout<W: Write>(builder: &mut tar::Builder<W>, dir: &str, victim: &str) {
        let name = format!("{dir}/.wh.{victim}");
        append_file(builder, &name, b"");
    }

    #[test]
    fn unpacks_regular_files() {
        let tmp = tempfile::tempdir().unwrap();
        let rootfs = tmp.path().join("rootfs");
        let layer = write_layer(tmp.path(), "l1.tar", |b| {
            append_file(b, "etc/hostname", b"box\n");
        });

        unpack_layers(&[layer], &rootfs).unwrap();
        let contents = fs::read_to_string(rootfs.join("etc/hostname")).unwrap();
        assert_eq!(contents, "box\n");
    }

    #[test]
    fn rejects_path_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let rootfs = tmp.path().join("rootfs");
        let layer = write_layer(tmp.path(), "l1.tar", |b| {
            append_file(b, "../etc/passwd", b"root:x:0:0\n");
        });

        let err = unpack_layers(&[layer], &rootfs).unwrap_err();
        assert!(matches!(err, Error::PathTraversal(_)));
    }

    #[test]
    fn whiteout_removes_earlier_layer_file() {
        let tmp = tempfile::tempdir().unwrap();
        let rootfs = tmp.path().join("rootfs");

        let layer1 = write_layer(tmp.path(), "l1.tar", |b| {
            append_file(b, "a/b", b"hello");
        });
        let layer2 = write_layer(tmp.path(), "l2.tar", |b| {
            append_whiteout(b, "a", "b");
        });

        unpack_layers(&[layer1, layer2], &rootfs).unwrap();
        assert!(!rootfs.join("a/b").exists());
        assert!(!rootfs.join("a/.wh.b").exists());
    }

    #[test]
    fn opaque_whiteout_is_ignored_not_acted_on() {
        let tmp = tempfile::tempdir().unwrap();
        let rootfs = tmp.path().join("rootfs");

        let layer1 = write_layer(tmp.path(), "l1.tar", |b| {
            append_file(b, "a/b", b"hello");
        });
        let layer2 = write_layer(tmp.path(), "l2.tar", |b| {
            append_file(b, "a/.wh..wh..opq", b"");
        });

        unpack_layers(&[layer1, layer2], &rootfs).unwrap();
        // Known gap: opaque whiteouts do not remove lower-layer siblings.
        assert!(rootfs.join("a/b").exists());
    }

    #[test]
    fn later_layer_overwrites_earlier_layer() {
        let tmp = tempfile::tempdir().unwrap();
        let rootfs = tmp.path().join("rootfs");

        let layer1 = write_layer(tmp.path(), "l1.tar", |b| {
            append_file(b, "a.txt", b"first");
        });
        let layer2 = write_layer(tmp.path(), "l2.tar", |b| {
            append_file(b, "a.txt", b"second");
        });

        unpack_layers(&[layer1, layer2], &rootfs).unwrap();
        assert_eq!(fs::read_to_string(rootfs.join("a.txt")).unwrap(), "second");
    }

    #[test]
    fn detects_gzip_magic_and_unpacks_compressed_layer() {
        let tmp = tempfile::tempdir().unwrap();
        let rootfs = tmp.path().join("rootfs");
        let layer_path = tmp.path().join("l1.tar.gz");

        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            append_file(&mut builder, "x", b"y");
            builder.finish().unwrap();
        }
        let file = File::create(&layer_path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap();

        unpack_layers(&[layer_path], &rootfs).unwrap();
        assert_eq!(fs::read_to_string(rootfs.join("x")).unwrap(), "y");
    }
}
