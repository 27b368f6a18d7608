//! Image archives: packaging a staged directory, compressing it, reading its manifest back.

pub mod compress;
pub mod extract;

pub use compress::compress;
pub use extract::{extract_manifest, extract_manifest_from_reader};

use crate::constants::{PATH_IMAGE_ACI, PATH_MANIFEST, PATH_ROOTFS};
use crate::error::{Error, ErrorFieldExt, ErrorKind, Result, ResultExt};
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;

/// Package `<dir>/manifest` and `<dir>/rootfs/**` into `<dir>/image.aci`.
///
/// Entries are added in sorted walk order. Timestamps are kept, so archives of
/// identical trees are equal in content but not necessarily byte for byte.
pub fn package_directory(dir: &Path) -> Result<PathBuf> {
    let manifest = dir.join(PATH_MANIFEST);
    let rootfs = dir.join(PATH_ROOTFS);
    let target = dir.join(PATH_IMAGE_ACI);
    let tmp = dir.join(format!("{}.tmp", PATH_IMAGE_ACI));

    if !manifest.is_file() {
        return Err(Error::new(ErrorKind::Archive, "No manifest to package")
            .with_field("path", manifest.display()));
    }

    let file = File::create(&tmp)
        .err_ctx(ErrorKind::Archive, "Failed to create image tar")
        .field("path", tmp.display())?;
    let mut tar = Builder::new(file);
    tar.follow_symlinks(false);

    tar.append_path_with_name(&manifest, PATH_MANIFEST)
        .err_ctx(ErrorKind::Archive, "Failed to add manifest to tar")
        .field("path", manifest.display())?;

    if rootfs.is_dir() {
        append_tree(&mut tar, &rootfs, Path::new(PATH_ROOTFS))
            .field("path", rootfs.display())?;
    }

    tar.into_inner()
        .and_then(|f| f.sync_all())
        .err_ctx(ErrorKind::Archive, "Failed to tar aci")
        .field("path", dir.display())?;

    std::fs::rename(&tmp, &target)
        .err_ctx(ErrorKind::Archive, "Failed to move image tar in place")
        .field("path", target.display())?;
    Ok(target)
}

fn append_tree(tar: &mut Builder<File>, root: &Path, name: &Path) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.err_ctx(ErrorKind::Archive, "Failed to walk rootfs")?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .err_ctx(ErrorKind::Archive, "Entry outside of rootfs")?;
        let archive_name = name.join(rel);

        let added = if entry.file_type().is_dir() {
            tar.append_dir(&archive_name, entry.path())
        } else {
            tar.append_path_with_name(entry.path(), &archive_name)
        };
        added
            .err_ctx(ErrorKind::Archive, "Failed to add rootfs entry to tar")
            .field("entry", archive_name.display())?;
    }
    Ok(())
}
